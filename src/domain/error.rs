// ==========================================
// 需求预测冲减模块 - 领域错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 所有错误同步抛出，不做内部重试；
//       由调用方（配置加载器 / 批量冲减驱动）决定中止或跳过
// ==========================================

use crate::domain::time::DateRange;
use thiserror::Error;

/// 领域层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    // ===== 非法修改 =====
    #[error("非法修改: 预测 {forecast} 的{field}由分桶派生，不能直接设置")]
    InvalidMutation { forecast: String, field: String },

    // ===== 数据校验错误 =====
    #[error("数据校验失败 (预测 {forecast}, 区间 {}): {message}", range_label(.range))]
    DataValidation {
        forecast: String,
        range: Option<DateRange>,
        message: String,
    },

    // ===== 引用错误 =====
    #[error("预测不存在: {0}")]
    ForecastNotFound(String),

    #[error("预测已存在: {0}")]
    DuplicateForecast(String),

    #[error("日历不存在: {0}")]
    CalendarNotFound(String),

    #[error("日历仍被预测引用，禁止删除: calendar={calendar}, forecast={forecast}")]
    CalendarInUse { calendar: String, forecast: String },

    #[error("订单不存在: {0}")]
    OrderNotFound(String),

    #[error("订单已存在: {0}")]
    DuplicateOrder(String),
}

impl ForecastError {
    /// 构造数据校验错误（带区间上下文）
    pub fn validation(
        forecast: impl Into<String>,
        range: Option<DateRange>,
        message: impl Into<String>,
    ) -> Self {
        ForecastError::DataValidation {
            forecast: forecast.into(),
            range,
            message: message.into(),
        }
    }

    /// 是否为数据校验类错误（导入时可跳过）
    pub fn is_validation(&self) -> bool {
        matches!(self, ForecastError::DataValidation { .. })
    }
}

/// 区间文本（无区间时为 "-"）
fn range_label(range: &Option<DateRange>) -> String {
    match range {
        Some(range) => range.to_string(),
        None => "-".to_string(),
    }
}

/// Result 类型别名
pub type ForecastResult<T> = Result<T, ForecastError>;
