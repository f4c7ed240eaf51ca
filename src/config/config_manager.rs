// ==========================================
// 需求预测冲减模块 - 配置管理器
// ==========================================
// 职责: 模块参数的加载、查询、覆写
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::forecast_config::ForecastConfig;
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::time::DateRange;
use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// 日期时间存储格式
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 配置作用域（当前仅 global）
pub const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例（必要时建表）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：会对传入连接再次应用统一 PRAGMA 与建表（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
            init_schema(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![GLOBAL_SCOPE, key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入配置值（UPSERT）
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![GLOBAL_SCOPE, key, value],
        )?;
        Ok(())
    }

    fn get_bool_or(&self, key: &str, default: bool) -> Result<bool, Box<dyn Error>> {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "y" => Ok(true),
                "false" | "0" | "no" | "n" => Ok(false),
                other => Err(format!("配置值格式错误 (key: {}): {}", key, other).into()),
            },
        }
    }

    fn get_datetime(&self, key: &str) -> Result<Option<NaiveDateTime>, Box<dyn Error>> {
        match self.get_config_value(key)? {
            None => Ok(None),
            Some(raw) => Ok(Some(NaiveDateTime::parse_from_str(raw.trim(), DATETIME_FORMAT)?)),
        }
    }

    // ===== 预测模块参数 =====

    /// 加载模块参数，缺失项使用默认值
    pub fn load_forecast_config(&self) -> Result<ForecastConfig, Box<dyn Error>> {
        let defaults = ForecastConfig::default();

        let customer_then_item_hierarchy = self.get_bool_or(
            config_keys::CUSTOMER_THEN_ITEM_HIERARCHY,
            defaults.customer_then_item_hierarchy,
        )?;
        let match_using_delivery_operation = self.get_bool_or(
            config_keys::MATCH_USING_DELIVERY_OPERATION,
            defaults.match_using_delivery_operation,
        )?;

        let horizon = match (
            self.get_datetime(config_keys::HORIZON_START)?,
            self.get_datetime(config_keys::HORIZON_END)?,
        ) {
            (Some(start), Some(end)) => DateRange::new(start, end),
            (Some(start), None) => DateRange::new(
                start,
                start + Duration::seconds(defaults.horizon.duration_secs()),
            ),
            _ => defaults.horizon,
        };

        let config = ForecastConfig {
            customer_then_item_hierarchy,
            match_using_delivery_operation,
            horizon,
        };
        tracing::info!(
            customer_then_item_hierarchy = config.customer_then_item_hierarchy,
            match_using_delivery_operation = config.match_using_delivery_operation,
            horizon = %config.horizon,
            "预测模块参数已加载"
        );
        Ok(config)
    }

    /// 保存模块参数
    pub fn save_forecast_config(&self, config: &ForecastConfig) -> Result<(), Box<dyn Error>> {
        self.set_config_value(
            config_keys::CUSTOMER_THEN_ITEM_HIERARCHY,
            &config.customer_then_item_hierarchy.to_string(),
        )?;
        self.set_config_value(
            config_keys::MATCH_USING_DELIVERY_OPERATION,
            &config.match_using_delivery_operation.to_string(),
        )?;
        self.set_config_value(
            config_keys::HORIZON_START,
            &config.horizon.start.format(DATETIME_FORMAT).to_string(),
        )?;
        self.set_config_value(
            config_keys::HORIZON_END,
            &config.horizon.end.format(DATETIME_FORMAT).to_string(),
        )?;
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 层级查找顺序
    pub const CUSTOMER_THEN_ITEM_HIERARCHY: &str = "forecast.customer_then_item_hierarchy";

    // 交付工序匹配
    pub const MATCH_USING_DELIVERY_OPERATION: &str = "forecast.match_using_delivery_operation";

    // 计划期
    pub const HORIZON_START: &str = "forecast.horizon_start";
    pub const HORIZON_END: &str = "forecast.horizon_end";
}
