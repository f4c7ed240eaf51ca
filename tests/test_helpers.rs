// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、固定计划期、按周日历的计划上下文
// ==========================================
#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use forecast_netting::config::ForecastConfig;
use forecast_netting::domain::{BucketSize, CustomerOrder, DateRange, WeightedCalendar};
use forecast_netting::engine::PlanningContext;
use std::error::Error;
use tempfile::NamedTempFile;

/// 创建临时测试数据库
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("临时文件路径不是 UTF-8")?
        .to_string();
    Ok((temp_file, db_path))
}

/// 2026 年某日零点
pub fn dt(m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// 固定计划期: 2026-01-05 ~ 2026-02-02（4 个整周）
pub fn test_horizon() -> DateRange {
    DateRange::new(dt(1, 5), dt(2, 2))
}

pub fn weekly_calendar() -> WeightedCalendar {
    WeightedCalendar::regular("weeks", dt(1, 5), dt(2, 2), BucketSize::Week, 1.0)
}

/// 已登记 "weeks" 日历的计划上下文
pub fn weekly_context() -> PlanningContext {
    let mut ctx = PlanningContext::new(ForecastConfig::default().with_horizon(test_horizon()));
    ctx.register_calendar(weekly_calendar());
    ctx
}

/// 创建按周分桶的预测，并把 weekly_total × 4 均匀分配到计划期
pub fn add_weekly_forecast(
    ctx: &mut PlanningContext,
    name: &str,
    item: Option<&str>,
    customer: Option<&str>,
    policy: &str,
    weekly_total: f64,
) {
    ctx.create_forecast(name, item, customer)
        .unwrap()
        .set_policy(policy)
        .unwrap();
    ctx.assign_calendar(name, "weeks").unwrap();
    ctx.forecasts_mut()
        .require_mut(name)
        .unwrap()
        .set_quantity_range(test_horizon(), weekly_total * 4.0)
        .unwrap();
}

pub fn order(
    id: &str,
    item: &str,
    customer: Option<&str>,
    qty: f64,
    due: NaiveDateTime,
) -> CustomerOrder {
    CustomerOrder::new(id, item, customer, qty, due)
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
