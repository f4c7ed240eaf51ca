// ==========================================
// 需求预测冲减模块 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 统一建表（幂等）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS forecast (
            name TEXT PRIMARY KEY,
            item TEXT,
            customer TEXT,
            calendar TEXT,
            priority INTEGER NOT NULL DEFAULT 0,
            plan_policy TEXT NOT NULL DEFAULT 'PLANLATE',
            delivery_policy TEXT NOT NULL DEFAULT 'MULTIDELIVERY',
            operation TEXT
        );

        CREATE TABLE IF NOT EXISTS forecast_bucket (
            forecast_name TEXT NOT NULL REFERENCES forecast(name) ON DELETE CASCADE,
            seq_no INTEGER NOT NULL,
            quantity REAL NOT NULL DEFAULT 0,
            net_quantity REAL,
            start_at TEXT,
            end_at TEXT,
            PRIMARY KEY (forecast_name, seq_no)
        );

        CREATE TABLE IF NOT EXISTS forecast_calendar (
            name TEXT PRIMARY KEY,
            definition TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS forecast_solver (
            name TEXT PRIMARY KEY,
            automatic INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS forecast_hierarchy (
            dimension TEXT NOT NULL,
            name TEXT NOT NULL,
            parent TEXT,
            PRIMARY KEY (dimension, name)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
