// ==========================================
// 需求预测冲减模块 - 需求能力接口
// ==========================================
// 实现者: Forecast (汇总) / ForecastBucket (分桶) / CustomerOrder (订单)
// 用途: 上层需求处理代码以统一方式读取需求属性
// ==========================================

use crate::domain::error::ForecastResult;
use crate::domain::types::{DemandKind, DemandPolicy};
use chrono::NaiveDateTime;

// ==========================================
// Trait: Demand
// ==========================================
pub trait Demand {
    /// 需求变体
    fn kind(&self) -> DemandKind;

    fn name(&self) -> &str;

    fn item(&self) -> Option<&str>;

    fn customer(&self) -> Option<&str>;

    /// 优先级（数值越小越优先）
    fn priority(&self) -> i32;

    /// 交期（没有分桶的预测返回 None）
    fn due(&self) -> Option<NaiveDateTime>;

    /// 交付工序
    fn operation(&self) -> Option<&str>;

    fn quantity(&self) -> f64;

    fn policy(&self) -> DemandPolicy;

    /// 隐藏需求不出现在对外列表中
    fn is_hidden(&self) -> bool {
        false
    }

    /// 所属需求名称
    fn owner(&self) -> Option<&str> {
        None
    }

    fn set_quantity(&mut self, quantity: f64) -> ForecastResult<()>;

    fn set_due(&mut self, due: NaiveDateTime) -> ForecastResult<()>;
}
