use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true, disable_help_subcommand = true)]
pub struct Args {
    /// Notebook root (defaults to the last notebook used)
    #[arg(short, long, value_name = "DIR", global = true)]
    pub notebook: Option<PathBuf>,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, value_name = "FILE", global = true)]
    pub settings: Option<PathBuf>,

    /// Verbosity level (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a notebook at PATH and make it the current one
    Init {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Display name (defaults to the folder name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Print the folder and note tree
    Tree,

    /// Create a folder; parents must exist
    Mkdir {
        /// Folder path relative to the notebook root
        #[arg(value_name = "FOLDER")]
        path: String,
    },

    /// Create a note in FOLDER
    New {
        /// Folder path relative to the notebook root ("" for the root)
        #[arg(value_name = "FOLDER")]
        folder: String,

        /// Note name; defaults to Untitled.<suffix>
        #[arg(value_name = "NAME")]
        name: Option<String>,

        /// Write a "# title" line into Markdown notes
        #[arg(long, conflicts_with = "no_title")]
        title: bool,

        #[arg(long)]
        no_title: bool,
    },

    /// List the notes of FOLDER in their manual order
    Ls {
        #[arg(value_name = "FOLDER", default_value = "")]
        folder: String,
    },

    /// Delete notes
    Rm {
        #[arg(value_name = "NOTE", required = true)]
        notes: Vec<String>,

        /// Delete from disk instead of moving to the recycle bin
        #[arg(long)]
        permanent: bool,
    },

    /// Rename a note
    Mv {
        #[arg(value_name = "NOTE")]
        note: String,

        #[arg(value_name = "NEW_NAME")]
        new_name: String,
    },

    /// Copy notes into FOLDER, or move them with --cut
    Cp {
        #[arg(value_name = "NOTE", required = true)]
        notes: Vec<String>,

        #[arg(long, value_name = "FOLDER")]
        to: String,

        #[arg(long)]
        cut: bool,
    },

    /// Copy external files into FOLDER as notes
    Import {
        #[arg(value_name = "FOLDER")]
        folder: String,

        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// Attach files to a note
    Attach {
        #[arg(value_name = "NOTE")]
        note: String,

        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// Delete attachments of a note (all of them if none are named)
    Detach {
        #[arg(value_name = "NOTE")]
        note: String,

        #[arg(value_name = "ATTACHMENT")]
        names: Vec<String>,

        #[arg(long)]
        permanent: bool,
    },

    /// List the attachments of a note
    Attachments {
        #[arg(value_name = "NOTE")]
        note: String,
    },
}
