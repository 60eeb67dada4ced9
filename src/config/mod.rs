mod config;

pub use config::{
    HeartbeatSettings, IndexerSettings, PostgresSettings, Settings, TzktSettings,
};
