use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct IngestCommand {
    /// JSON export of the instrument file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Owner recorded on the dataset; omit for single-tenant use
    #[arg(long, env = "TDMS_OWNER")]
    pub owner: Option<String>,

    /// Stored filename, defaults to the file's name
    #[arg(long)]
    pub name: Option<String>,
}
