use herald_sdk::objects::ChannelId;
use sqlx::PgPool;

/// Executes SQL commands as `kanau` processors.
///
/// `legacy_channel` is the channel a bare, pre-multi-channel message id is
/// attributed to when an old event row is read.
#[derive(Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
    pub legacy_channel: ChannelId,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool, legacy_channel: ChannelId) -> Self {
        Self {
            pool,
            legacy_channel,
        }
    }
}
