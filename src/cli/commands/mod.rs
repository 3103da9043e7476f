pub mod datasets;
pub mod ingest;
pub mod window;

pub use datasets::{ChannelsCommand, DatasetsCommand, DeleteCommand, RangeCommand};
pub use ingest::IngestCommand;
pub use window::WindowCommand;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest a JSON instrument file export
    Ingest(IngestCommand),
    /// Read a window of one channel
    Window(WindowCommand),
    /// List datasets
    Datasets(DatasetsCommand),
    /// List the channels of a dataset
    Channels(ChannelsCommand),
    /// Show the stored extent of a channel
    Range(RangeCommand),
    /// Delete a dataset with its channels and points
    Delete(DeleteCommand),
}
