// ==========================================
// 需求预测冲减模块 - 配置层
// ==========================================
// 职责: 模块参数管理
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod forecast_config;

// 重导出核心配置
pub use config_manager::{config_keys, ConfigManager};
pub use forecast_config::ForecastConfig;
