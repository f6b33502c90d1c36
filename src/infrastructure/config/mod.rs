mod settings;

pub use settings::{
    BenchConfig, DbConfig, LogFormat, LoggingConfig, PoolConfig, ServerConfig, Settings,
    ShardsConfig,
};
