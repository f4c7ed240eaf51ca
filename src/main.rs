// ==========================================
// 需求预测冲减模块 - 命令行入口
// ==========================================
// 用法:
//   forecast-netting [--db PATH] calendar <name> <start> <end> <day|week|month> [weight]
//   forecast-netting [--db PATH] forecast <name> <item> <calendar> [customer] [policy]
//   forecast-netting [--db PATH] hierarchy <item|customer> <name> [parent]
//   forecast-netting [--db PATH] import <forecast.csv> [--skip]
//   forecast-netting [--db PATH] net <orders.csv>
//   forecast-netting [--db PATH] automatic <on|off>
//   forecast-netting [--db PATH] export
// ==========================================

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use forecast_netting::config::ConfigManager;
use forecast_netting::domain::{BucketSize, WeightedCalendar};
use forecast_netting::engine::PlanningContext;
use forecast_netting::importer::{read_orders, ForecastCsvImporter, ImportErrorPolicy};
use forecast_netting::repository::ForecastStore;
use forecast_netting::{logging, APP_NAME, VERSION};
use std::path::PathBuf;

/// 数据库路径环境变量
const DB_PATH_ENV: &str = "FORECAST_NETTING_DB_PATH";

fn main() -> Result<()> {
    logging::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let db_path = take_db_path(&mut args).unwrap_or_else(default_db_path);
    let mut args = args.into_iter();
    let command = args.next().ok_or_else(|| anyhow!(usage()))?;
    let rest: Vec<String> = args.collect();

    tracing::info!(app = APP_NAME, version = VERSION, db_path = %db_path, "启动");

    let config_manager =
        ConfigManager::new(&db_path).map_err(|e| anyhow!("配置加载失败: {}", e))?;
    let config = config_manager
        .load_forecast_config()
        .map_err(|e| anyhow!("配置加载失败: {}", e))?;
    let store = ForecastStore::new(&db_path)?;

    let mut ctx = PlanningContext::new(config);
    for calendar in store.load_calendars()? {
        ctx.register_calendar(calendar);
    }
    ctx.load(&store)?;

    match command.as_str() {
        "calendar" => {
            let [name, start, end, size, ..] = rest.as_slice() else {
                bail!(usage());
            };
            let weight = match rest.get(4) {
                Some(raw) => raw
                    .parse::<f64>()
                    .with_context(|| format!("权重格式错误: {}", raw))?,
                None => 1.0,
            };
            let calendar = WeightedCalendar::regular(
                name.as_str(),
                parse_date_arg(start)?,
                parse_date_arg(end)?,
                parse_bucket_size(size)?,
                weight,
            );
            store.save_calendar(&calendar)?;
            println!("calendar={} buckets={}", name, calendar.buckets().len());
            return Ok(());
        }
        "forecast" => {
            let [name, item, calendar, ..] = rest.as_slice() else {
                bail!(usage());
            };
            let customer = rest.get(3).map(String::as_str).filter(|c| !c.is_empty());
            let forecast = ctx.create_forecast(name, Some(item.as_str()), customer)?;
            if let Some(policy) = rest.get(4) {
                forecast.set_policy(policy)?;
            }
            ctx.assign_calendar(name, calendar)?;
            println!("forecast={}", name);
        }
        "hierarchy" => {
            let [dimension, name, ..] = rest.as_slice() else {
                bail!(usage());
            };
            let parent = rest.get(2).map(String::as_str).filter(|p| !p.is_empty());
            let hierarchies = ctx.hierarchies_mut();
            let hierarchy = match dimension.as_str() {
                "item" => &mut hierarchies.items,
                "customer" => &mut hierarchies.customers,
                other => bail!("未知层级维度: {}", other),
            };
            hierarchy.add(name.as_str(), parent);
            println!("{}={} parent={}", dimension, name, parent.unwrap_or("-"));
        }
        "import" => {
            let file = rest.first().ok_or_else(|| anyhow!(usage()))?;
            let policy = if rest.iter().any(|a| a == "--skip") {
                ImportErrorPolicy::Skip
            } else {
                ImportErrorPolicy::Abort
            };
            let report =
                ForecastCsvImporter::new(policy).import_file(file, ctx.forecasts_mut())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "net" => {
            let file = rest.first().ok_or_else(|| anyhow!(usage()))?;
            let mut outcomes = Vec::new();
            for order in read_orders(file)? {
                outcomes.extend(ctx.add_order(order)?);
            }
            outcomes.extend(ctx.run_netting()?);
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
        }
        "automatic" => {
            let automatic = match rest.first().map(String::as_str) {
                Some("on") => true,
                Some("off") => false,
                _ => bail!(usage()),
            };
            ctx.solver_mut().set_automatic(automatic);
            println!("automatic={}", automatic);
        }
        "export" => {
            println!("{}", ctx.snapshot().to_json()?);
            return Ok(());
        }
        other => bail!("未知命令: {}\n{}", other, usage()),
    }

    ctx.save(&store)?;
    Ok(())
}

fn usage() -> String {
    format!(
        "{} {}\n用法: forecast-netting [--db PATH] <calendar|forecast|hierarchy|import|net|automatic|export> ...",
        APP_NAME, VERSION
    )
}

fn take_db_path(args: &mut Vec<String>) -> Option<String> {
    let idx = args.iter().position(|a| a == "--db")?;
    args.remove(idx);
    (idx < args.len()).then(|| args.remove(idx))
}

/// 默认数据库路径: 环境变量 → 用户数据目录 → 当前目录
fn default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./forecast_netting.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("forecast-netting");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("forecast_netting.db");
        }
    }
    path.to_string_lossy().to_string()
}

fn parse_date_arg(raw: &str) -> Result<NaiveDateTime> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| anyhow!("日期格式错误（期望 YYYY-MM-DD）: {}", raw))
}

fn parse_bucket_size(raw: &str) -> Result<BucketSize> {
    match raw.to_lowercase().as_str() {
        "day" => Ok(BucketSize::Day),
        "week" => Ok(BucketSize::Week),
        "month" => Ok(BucketSize::Month),
        other => bail!("不支持的分桶粒度: {}", other),
    }
}
