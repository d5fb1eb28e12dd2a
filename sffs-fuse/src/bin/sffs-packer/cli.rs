use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// NAND image file
    pub image: PathBuf,

    /// keys.bin holding the NAND AES and HMAC keys
    #[arg(long, short)]
    pub keys: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a fresh image and format it
    Format,

    /// Copy a host directory into the image
    Pack {
        /// Host source directory
        #[arg(long, short)]
        source: PathBuf,

        /// Target directory inside the image
        #[arg(long, short, default_value = "/")]
        target: String,

        #[arg(long, default_value_t = 0)]
        uid: u32,

        #[arg(long, default_value_t = 0)]
        gid: u16,
    },

    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print a file to stdout
    Cat { path: String },

    /// Copy a directory tree out of the image
    Extract {
        /// Host output directory
        #[arg(long, short = 'O')]
        out: PathBuf,

        #[arg(default_value = "/")]
        path: String,
    },

    /// Show usage of the whole NAND
    Stats,
}
