use std::env::{self, VarError};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Default capacity of the in-process heap oracle, in 4-byte words.
/// 32 MiB of words (128 MiB of backing storage).
const DEFAULT_ORACLE_CAPACITY_WORDS: u32 = 32 * 1024 * 1024;
const SEGTREE_ALLOC_ORACLE_CAPACITY_WORDS: &str = "SEGTREE_ALLOC_ORACLE_CAPACITY_WORDS";

fn main() {
    write_oracle_capacity_words_file();
    export_rerun_rules();
}

fn write_oracle_capacity_words_file() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR environment variable not provided");
    let dest_path = Path::new(&out_dir).join("oracle_capacity_words.txt");
    let words: u32 = match env::var(SEGTREE_ALLOC_ORACLE_CAPACITY_WORDS) {
        Ok(s) => s
            .parse()
            .expect("could not interpret SEGTREE_ALLOC_ORACLE_CAPACITY_WORDS as a u32"),
        Err(VarError::NotPresent) => DEFAULT_ORACLE_CAPACITY_WORDS,
        Err(VarError::NotUnicode(_)) => {
            panic!("SEGTREE_ALLOC_ORACLE_CAPACITY_WORDS must be valid unicode")
        }
    };
    let mut f = File::create(&dest_path).expect("could not create oracle capacity metadata file");
    write!(f, "{}", words).expect("could not write oracle capacity metadata file");
    f.flush().expect("could not flush oracle capacity metadata file");
}

fn export_rerun_rules() {
    println!(
        "cargo:rerun-if-env-changed={}",
        SEGTREE_ALLOC_ORACLE_CAPACITY_WORDS
    );
    for entry_result in
        globwalk::glob("src/**/*.rs").expect("could not create a valid rust-file-finding glob")
    {
        let file = entry_result.expect("failed to read file information");
        println!("cargo:rerun-if-changed={}", file.path().display());
    }
}
