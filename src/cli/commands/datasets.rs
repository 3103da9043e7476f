use clap::Args;
use uuid::Uuid;

#[derive(Args)]
pub struct DatasetsCommand {
    /// Only datasets owned by this user
    #[arg(long, env = "TDMS_OWNER")]
    pub owner: Option<String>,
}

#[derive(Args)]
pub struct ChannelsCommand {
    #[arg(value_name = "DATASET_ID")]
    pub dataset_id: Uuid,

    #[arg(long, env = "TDMS_OWNER")]
    pub owner: Option<String>,
}

#[derive(Args)]
pub struct RangeCommand {
    #[arg(value_name = "CHANNEL_ID")]
    pub channel_id: Uuid,

    #[arg(long, env = "TDMS_OWNER")]
    pub owner: Option<String>,
}

#[derive(Args)]
pub struct DeleteCommand {
    #[arg(value_name = "DATASET_ID")]
    pub dataset_id: Uuid,

    #[arg(long, env = "TDMS_OWNER")]
    pub owner: Option<String>,
}
