// ==========================================
// 需求预测冲减模块 - 预测持久化仓储（SQLite）
// ==========================================
// 职责: forecast / forecast_bucket / forecast_calendar / forecast_solver / forecast_hierarchy 表的读写
// 红线: Repository 不含业务逻辑，只搬运记录
// ==========================================

use crate::db::{configure_sqlite_connection, init_schema, open_sqlite_connection};
use crate::domain::calendar::{BucketCalendar, WeightedCalendar};
use crate::domain::hierarchy::Hierarchies;
use crate::domain::record::{BucketRecord, ForecastRecord, SolverRecord};
use crate::domain::types::DemandPolicy;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// 日期时间存储格式
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 层级维度标识
const ITEM_DIMENSION: &str = "item";
const CUSTOMER_DIMENSION: &str = "customer";

// ==========================================
// ForecastStore - 预测仓储
// ==========================================
pub struct ForecastStore {
    conn: Arc<Mutex<Connection>>,
}

impl ForecastStore {
    /// 创建新的预测仓储实例（必要时建表）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            configure_sqlite_connection(&guard)?;
            init_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 保存预测记录（整体替换）
    ///
    /// # 参数
    /// - records: 预测记录列表
    ///
    /// # 返回
    /// - Ok(usize): 写入的分桶记录数
    /// - Err: 数据库错误（事务回滚）
    pub fn save_records(&self, records: &[ForecastRecord]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM forecast_bucket", [])?;
        tx.execute("DELETE FROM forecast", [])?;

        let mut bucket_count = 0;
        for record in records {
            tx.execute(
                r#"
                INSERT INTO forecast (
                    name, item, customer, calendar, priority,
                    plan_policy, delivery_policy, operation
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    record.name,
                    record.item,
                    record.customer,
                    record.calendar,
                    record.priority,
                    record.policy.plan.to_string(),
                    record.policy.delivery.to_string(),
                    record.operation,
                ],
            )?;

            for (seq_no, bucket) in record.buckets.iter().enumerate() {
                tx.execute(
                    r#"
                    INSERT INTO forecast_bucket (
                        forecast_name, seq_no, quantity, net_quantity, start_at, end_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    params![
                        record.name,
                        seq_no as i64,
                        bucket.quantity,
                        bucket.net,
                        bucket.start.map(format_datetime),
                        bucket.end.map(format_datetime),
                    ],
                )?;
                bucket_count += 1;
            }
        }

        tx.commit()?;
        tracing::info!(
            forecast_count = records.len(),
            bucket_count,
            "预测记录已保存"
        );
        Ok(bucket_count)
    }

    /// 读取全部预测记录（按名称排序，分桶按 seq_no 排序）
    pub fn load_records(&self) -> RepositoryResult<Vec<ForecastRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT name, item, customer, calendar, priority,
                   plan_policy, delivery_policy, operation
            FROM forecast
            ORDER BY name
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, i32>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;

        let mut records: BTreeMap<String, ForecastRecord> = BTreeMap::new();
        for row in rows {
            let (name, item, customer, calendar, priority, plan, delivery, operation) = row?;
            let policy = DemandPolicy::default()
                .with_tokens(&format!("{},{}", plan, delivery))
                .map_err(|token| RepositoryError::FieldValueError {
                    field: "policy".to_string(),
                    message: format!("无法识别的策略: {}", token),
                })?;
            records.insert(
                name.clone(),
                ForecastRecord {
                    name,
                    item,
                    customer,
                    calendar,
                    priority,
                    policy,
                    operation,
                    buckets: Vec::new(),
                },
            );
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT forecast_name, quantity, net_quantity, start_at, end_at
            FROM forecast_bucket
            ORDER BY forecast_name, seq_no
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        for row in rows {
            let (forecast_name, quantity, net, start_at, end_at) = row?;
            let record = records
                .get_mut(&forecast_name)
                .ok_or_else(|| RepositoryError::NotFound {
                    entity: "forecast".to_string(),
                    id: forecast_name.clone(),
                })?;
            record.buckets.push(BucketRecord {
                quantity,
                start: start_at.as_deref().map(parse_datetime).transpose()?,
                end: end_at.as_deref().map(parse_datetime).transpose()?,
                net,
            });
        }

        Ok(records.into_values().collect())
    }

    /// 保存日历定义（JSON）
    pub fn save_calendar(&self, calendar: &WeightedCalendar) -> RepositoryResult<()> {
        let definition = serde_json::to_string(calendar).map_err(|e| {
            RepositoryError::FieldValueError {
                field: "definition".to_string(),
                message: e.to_string(),
            }
        })?;
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO forecast_calendar (name, definition) VALUES (?1, ?2)",
            params![calendar.name(), definition],
        )?;
        Ok(())
    }

    /// 读取全部日历定义
    pub fn load_calendars(&self) -> RepositoryResult<Vec<WeightedCalendar>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT name, definition FROM forecast_calendar ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut calendars = Vec::new();
        for row in rows {
            let (name, definition) = row?;
            let calendar: WeightedCalendar = serde_json::from_str(&definition).map_err(|e| {
                RepositoryError::FieldValueError {
                    field: format!("forecast_calendar.{}", name),
                    message: e.to_string(),
                }
            })?;
            calendars.push(calendar);
        }
        Ok(calendars)
    }

    /// 保存求解器记录
    pub fn save_solver(&self, solver: &SolverRecord) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO forecast_solver (name, automatic) VALUES (?1, ?2)",
            params![solver.name, solver.automatic],
        )?;
        Ok(())
    }

    /// 读取求解器记录（只取第一条）
    pub fn load_solver(&self) -> RepositoryResult<Option<SolverRecord>> {
        let conn = self.get_conn()?;
        let solver = conn
            .query_row(
                "SELECT name, automatic FROM forecast_solver ORDER BY name LIMIT 1",
                [],
                |row| {
                    Ok(SolverRecord {
                        name: row.get(0)?,
                        automatic: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(solver)
    }

    /// 保存物料/客户层级（整体替换）
    pub fn save_hierarchies(&self, hierarchies: &Hierarchies) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM forecast_hierarchy", [])?;

        let mut count = 0;
        for (dimension, hierarchy) in [
            (ITEM_DIMENSION, &hierarchies.items),
            (CUSTOMER_DIMENSION, &hierarchies.customers),
        ] {
            for (name, parent) in hierarchy.entries() {
                tx.execute(
                    "INSERT INTO forecast_hierarchy (dimension, name, parent) VALUES (?1, ?2, ?3)",
                    params![dimension, name, parent],
                )?;
                count += 1;
            }
        }

        tx.commit()?;
        tracing::debug!(node_count = count, "层级已保存");
        Ok(count)
    }

    /// 读取物料/客户层级
    pub fn load_hierarchies(&self) -> RepositoryResult<Hierarchies> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT dimension, name, parent FROM forecast_hierarchy ORDER BY dimension, name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut hierarchies = Hierarchies::new();
        for row in rows {
            let (dimension, name, parent) = row?;
            let hierarchy = match dimension.as_str() {
                ITEM_DIMENSION => &mut hierarchies.items,
                CUSTOMER_DIMENSION => &mut hierarchies.customers,
                other => {
                    return Err(RepositoryError::FieldValueError {
                        field: "forecast_hierarchy.dimension".to_string(),
                        message: format!("未知层级维度: {}", other),
                    })
                }
            };
            hierarchy.add(name, parent.as_deref());
        }
        Ok(hierarchies)
    }
}

fn format_datetime(at: NaiveDateTime) -> String {
    at.format(DATETIME_FORMAT).to_string()
}

fn parse_datetime(raw: &str) -> RepositoryResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).map_err(|e| {
        RepositoryError::FieldValueError {
            field: "start_at/end_at".to_string(),
            message: format!("{}: {}", raw, e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::PlanPolicy;
    use chrono::NaiveDate;

    fn store() -> ForecastStore {
        let conn = Connection::open_in_memory().unwrap();
        ForecastStore::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_save_and_load_records() {
        let store = store();
        let start = NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let record = ForecastRecord {
            name: "F1".to_string(),
            item: Some("A".to_string()),
            customer: None,
            calendar: Some("weeks".to_string()),
            priority: 3,
            policy: DemandPolicy {
                plan: PlanPolicy::PlanShort,
                ..Default::default()
            },
            operation: Some("ship".to_string()),
            buckets: vec![BucketRecord {
                quantity: 40.0,
                start: Some(start),
                end: Some(start + chrono::Duration::days(7)),
                net: Some(25.0),
            }],
        };

        assert_eq!(store.save_records(std::slice::from_ref(&record)).unwrap(), 1);
        let loaded = store.load_records().unwrap();
        assert_eq!(loaded, vec![record]);
    }

    #[test]
    fn test_calendar_definition_round_trip() {
        use crate::domain::calendar::BucketSize;

        let store = store();
        let start = NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let calendar = WeightedCalendar::regular(
            "weeks",
            start,
            start + chrono::Duration::days(14),
            BucketSize::Week,
            2.0,
        );
        store.save_calendar(&calendar).unwrap();

        let loaded = store.load_calendars().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name(), "weeks");
        assert_eq!(loaded[0].buckets().len(), 2);
        assert_eq!(loaded[0].value_at(start), 2.0);
    }

    #[test]
    fn test_solver_record_upsert() {
        let store = store();
        assert!(store.load_solver().unwrap().is_none());

        let solver = SolverRecord {
            name: "netting".to_string(),
            automatic: true,
        };
        store.save_solver(&solver).unwrap();
        assert_eq!(store.load_solver().unwrap(), Some(solver));
    }

    #[test]
    fn test_hierarchy_round_trip() {
        let store = store();
        assert_eq!(store.load_hierarchies().unwrap(), Hierarchies::new());

        let mut hierarchies = Hierarchies::new();
        hierarchies.items.add("BOLT-M8", Some("BOLTS"));
        hierarchies.customers.add("ACME-EU", Some("ACME"));
        assert_eq!(store.save_hierarchies(&hierarchies).unwrap(), 4);

        let loaded = store.load_hierarchies().unwrap();
        assert_eq!(loaded, hierarchies);
        assert_eq!(loaded.items.parent_of("BOLT-M8"), Some("BOLTS"));

        // 整体替换
        store.save_hierarchies(&Hierarchies::new()).unwrap();
        assert_eq!(store.load_hierarchies().unwrap(), Hierarchies::new());
    }
}
