// ==========================================
// 需求预测冲减模块 - 领域类型定义
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 交付策略: 延迟计划 / 短缺计划
// ==========================================
// 同时决定冲减时超出部分的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanPolicy {
    #[default]
    PlanLate,  // 允许延后，冲减时向后续分桶结转
    PlanShort, // 只按可用量满足，剩余不冲减
}

impl fmt::Display for PlanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanPolicy::PlanLate => write!(f, "PLANLATE"),
            PlanPolicy::PlanShort => write!(f, "PLANSHORT"),
        }
    }
}

// ==========================================
// 交付方式: 单次 / 多次
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryPolicy {
    SingleDelivery,
    #[default]
    MultiDelivery,
}

impl fmt::Display for DeliveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryPolicy::SingleDelivery => write!(f, "SINGLEDELIVERY"),
            DeliveryPolicy::MultiDelivery => write!(f, "MULTIDELIVERY"),
        }
    }
}

// ==========================================
// 需求策略组合
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct DemandPolicy {
    pub plan: PlanPolicy,
    pub delivery: DeliveryPolicy,
}

/// 单个策略标记
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyToken {
    Plan(PlanPolicy),
    Delivery(DeliveryPolicy),
}

impl PolicyToken {
    /// 解析策略标记（大小写不敏感）
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_uppercase().as_str() {
            "PLANLATE" => Some(PolicyToken::Plan(PlanPolicy::PlanLate)),
            "PLANSHORT" => Some(PolicyToken::Plan(PlanPolicy::PlanShort)),
            "SINGLEDELIVERY" => Some(PolicyToken::Delivery(DeliveryPolicy::SingleDelivery)),
            "MULTIDELIVERY" => Some(PolicyToken::Delivery(DeliveryPolicy::MultiDelivery)),
            _ => None,
        }
    }
}

impl DemandPolicy {
    pub fn plan_late(&self) -> bool {
        self.plan == PlanPolicy::PlanLate
    }

    pub fn single_delivery(&self) -> bool {
        self.delivery == DeliveryPolicy::SingleDelivery
    }

    /// 叠加策略标记串（逗号或空白分隔）
    ///
    /// # 返回
    /// - Ok(新策略)
    /// - Err(无法识别的标记)
    pub fn with_tokens(mut self, tokens: &str) -> Result<Self, String> {
        for raw in tokens.split(|c: char| c == ',' || c.is_whitespace()) {
            if raw.trim().is_empty() {
                continue;
            }
            match PolicyToken::parse(raw) {
                Some(PolicyToken::Plan(p)) => self.plan = p,
                Some(PolicyToken::Delivery(d)) => self.delivery = d,
                None => return Err(raw.trim().to_string()),
            }
        }
        Ok(self)
    }
}

impl fmt::Display for DemandPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.plan, self.delivery)
    }
}

// ==========================================
// 冲减求解器运行模式
// ==========================================
// 状态只能通过 set_automatic 切换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolverMode {
    #[default]
    Manual,    // 仅批量冲减
    Automatic, // 订阅订单变更，回调内同步冲减
}

impl fmt::Display for SolverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverMode::Manual => write!(f, "MANUAL"),
            SolverMode::Automatic => write!(f, "AUTOMATIC"),
        }
    }
}

// ==========================================
// 需求变体
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DemandKind {
    Aggregate, // 预测汇总
    Bucket,    // 预测分桶
    Order,     // 客户订单
}

impl fmt::Display for DemandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DemandKind::Aggregate => write!(f, "AGGREGATE"),
            DemandKind::Bucket => write!(f, "BUCKET"),
            DemandKind::Order => write!(f, "ORDER"),
        }
    }
}
