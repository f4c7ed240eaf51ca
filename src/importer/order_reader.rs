// ==========================================
// 需求预测冲减模块 - 订单 CSV 读取
// ==========================================
// 格式: id,item,customer,quantity,due[,priority][,operation]
// 说明: 只负责读取，冲减由 PlanningContext 完成
// ==========================================

use crate::domain::order::CustomerOrder;
use crate::importer::csv_importer::{get_string, parse_datetime};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{CsvParser, RawRecord};
use std::path::Path;

/// 读取订单 CSV（任一行错误即返回）
pub fn read_orders<P: AsRef<Path>>(file_path: P) -> ImportResult<Vec<CustomerOrder>> {
    CsvParser
        .parse(file_path.as_ref())?
        .iter()
        .map(|(row, raw)| parse_order(*row, raw))
        .collect()
}

fn parse_order(row: usize, raw: &RawRecord) -> ImportResult<CustomerOrder> {
    let required = |key: &str| {
        get_string(raw, key).ok_or_else(|| ImportError::FieldMappingError {
            row,
            message: format!("{} 为空", key),
        })
    };

    let id = required("id")?;
    let item = required("item")?;
    let quantity_raw = required("quantity")?;
    let quantity: f64 = quantity_raw
        .parse()
        .map_err(|e| ImportError::TypeConversionError {
            row,
            field: "quantity".to_string(),
            message: format!("{}: {}", quantity_raw, e),
        })?;
    let due = parse_datetime(raw, "due", row)?.ok_or_else(|| ImportError::FieldMappingError {
        row,
        message: "due 为空".to_string(),
    })?;

    let mut order = CustomerOrder::new(
        id,
        item,
        get_string(raw, "customer").as_deref(),
        quantity,
        due,
    );
    if let Some(priority) = get_string(raw, "priority") {
        order = order.with_priority(priority.parse().map_err(|e| {
            ImportError::TypeConversionError {
                row,
                field: "priority".to_string(),
                message: format!("{}: {}", priority, e),
            }
        })?);
    }
    if let Some(operation) = get_string(raw, "operation") {
        order = order.with_delivery_operation(operation);
    }
    Ok(order)
}
