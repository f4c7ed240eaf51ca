// ==========================================
// 需求预测冲减模块 - 预测数量 CSV 导入
// ==========================================
// 格式: forecast,start,end,quantity（表头大小写不敏感）
// 规则: 每行调用一次 set_quantity_range；end 为空视为单个时点
// 策略: Abort → 任一行失败则整批不生效；Skip → 跳过失败行继续
// ==========================================

use crate::domain::time::DateRange;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{CsvParser, RawRecord};
use crate::repository::ForecastRepository;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// 支持的日期时间格式（按顺序尝试）
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// 坏行处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImportErrorPolicy {
    /// 任一行失败则整批回滚
    #[default]
    Abort,
    /// 跳过失败行
    Skip,
}

/// 导入报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    pub batch_id: String,
    pub applied: usize,
    /// (行号, 原因)
    pub rejected: Vec<(usize, String)>,
}

/// 一行预测数量
#[derive(Debug, Clone, PartialEq)]
struct QuantityRow {
    row: usize,
    forecast: String,
    range: DateRange,
    quantity: f64,
}

// ==========================================
// ForecastCsvImporter
// ==========================================
pub struct ForecastCsvImporter {
    policy: ImportErrorPolicy,
}

impl ForecastCsvImporter {
    pub fn new(policy: ImportErrorPolicy) -> Self {
        Self { policy }
    }

    /// 导入 CSV 并写入预测仓储
    ///
    /// # 参数
    /// - file_path: CSV 文件路径
    /// - repo: 预测仓储（Abort 策略下失败时保持不变）
    ///
    /// # 返回
    /// - Ok(ImportReport): 导入报告
    /// - Err: 文件错误，或 Abort 策略下的第一个坏行
    #[instrument(skip(self, file_path, repo), fields(policy = ?self.policy))]
    pub fn import_file<P: AsRef<Path>>(
        &self,
        file_path: P,
        repo: &mut ForecastRepository,
    ) -> ImportResult<ImportReport> {
        let batch_id = Uuid::new_v4().to_string();
        let path = file_path.as_ref();
        info!(batch_id = %batch_id, file_path = %path.display(), "开始导入预测数量");

        let raw_records = CsvParser.parse(path)?;
        let report = match self.policy {
            ImportErrorPolicy::Abort => {
                // 在副本上应用，全部成功后才替换
                let mut working = repo.clone();
                let applied = self.apply_all(&raw_records, &mut working)?;
                *repo = working;
                ImportReport {
                    batch_id,
                    applied,
                    rejected: Vec::new(),
                }
            }
            ImportErrorPolicy::Skip => {
                let mut applied = 0;
                let mut rejected = Vec::new();
                for (row, raw) in &raw_records {
                    match parse_row(*row, raw).and_then(|r| apply_row(&r, repo)) {
                        Ok(()) => applied += 1,
                        Err(e) => {
                            warn!(row, error = %e, "跳过无效行");
                            rejected.push((*row, e.to_string()));
                        }
                    }
                }
                ImportReport {
                    batch_id,
                    applied,
                    rejected,
                }
            }
        };

        info!(
            batch_id = %report.batch_id,
            applied = report.applied,
            rejected = report.rejected.len(),
            "预测数量导入完成"
        );
        Ok(report)
    }

    fn apply_all(
        &self,
        raw_records: &[(usize, RawRecord)],
        repo: &mut ForecastRepository,
    ) -> ImportResult<usize> {
        let rows = raw_records
            .iter()
            .map(|(row, raw)| parse_row(*row, raw))
            .collect::<ImportResult<Vec<_>>>()?;
        for row in &rows {
            apply_row(row, repo)?;
        }
        Ok(rows.len())
    }
}

impl Default for ForecastCsvImporter {
    fn default() -> Self {
        Self::new(ImportErrorPolicy::default())
    }
}

fn apply_row(row: &QuantityRow, repo: &mut ForecastRepository) -> ImportResult<()> {
    repo.require_mut(&row.forecast)
        .and_then(|f| f.set_quantity_range(row.range, row.quantity))
        .map_err(|source| ImportError::Rejected {
            row: row.row,
            source,
        })
}

// ==========================================
// 字段映射
// ==========================================

fn parse_row(row: usize, raw: &RawRecord) -> ImportResult<QuantityRow> {
    let forecast = get_string(raw, "forecast").ok_or_else(|| ImportError::FieldMappingError {
        row,
        message: "forecast 为空".to_string(),
    })?;
    let start = parse_datetime(raw, "start", row)?.ok_or_else(|| {
        ImportError::FieldMappingError {
            row,
            message: "start 为空".to_string(),
        }
    })?;
    let end = parse_datetime(raw, "end", row)?.unwrap_or(start);

    let quantity_raw = get_string(raw, "quantity").ok_or_else(|| ImportError::FieldMappingError {
        row,
        message: "quantity 为空".to_string(),
    })?;
    let quantity: f64 = quantity_raw
        .parse()
        .map_err(|e| ImportError::TypeConversionError {
            row,
            field: "quantity".to_string(),
            message: format!("{}: {}", quantity_raw, e),
        })?;

    Ok(QuantityRow {
        row,
        forecast,
        range: DateRange::new(start, end),
        quantity,
    })
}

pub(crate) fn get_string(raw: &RawRecord, key: &str) -> Option<String> {
    raw.get(key).filter(|v| !v.is_empty()).cloned()
}

pub(crate) fn parse_datetime(
    raw: &RawRecord,
    key: &str,
    row: usize,
) -> ImportResult<Option<NaiveDateTime>> {
    let Some(value) = get_string(raw, key) else {
        return Ok(None);
    };

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&value, fmt).ok())
        .or_else(|| {
            // 只有日期时取当天零点
            NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(Some)
        .ok_or_else(|| ImportError::DateFormatError {
            row,
            field: key.to_string(),
            value,
        })
}
