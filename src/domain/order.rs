// ==========================================
// 需求预测冲减模块 - 客户订单
// ==========================================
// 职责: 订单实体 + 订单簿（待冲减订单、已冲减台账）
// 说明: 订单簿属于外部订单生命周期的最小实现，
//       变更通知由 PlanningContext 分发
// 红线: 回退只按台账记录的扣减量恢复，未冲减的订单不回退
// ==========================================

use crate::domain::demand::Demand;
use crate::domain::error::{ForecastError, ForecastResult};
use crate::domain::types::{DemandKind, DemandPolicy};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ==========================================
// CustomerOrder - 客户订单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerOrder {
    pub id: String,
    pub item: Option<String>,
    pub customer: Option<String>,
    pub quantity: f64,
    pub due: NaiveDateTime,
    pub priority: i32,
    pub delivery_operation: Option<String>,
    /// 创建序号（稳定的次级排序键，由订单簿分配）
    #[serde(default)]
    pub sequence: u64,
}

impl CustomerOrder {
    pub fn new(
        id: impl Into<String>,
        item: impl Into<String>,
        customer: Option<&str>,
        quantity: f64,
        due: NaiveDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            item: Some(item.into()),
            customer: customer.map(str::to_string),
            quantity,
            due,
            priority: 0,
            delivery_operation: None,
            sequence: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delivery_operation(mut self, operation: impl Into<String>) -> Self {
        self.delivery_operation = Some(operation.into());
        self
    }
}

impl Demand for CustomerOrder {
    fn kind(&self) -> DemandKind {
        DemandKind::Order
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn item(&self) -> Option<&str> {
        self.item.as_deref()
    }

    fn customer(&self) -> Option<&str> {
        self.customer.as_deref()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn due(&self) -> Option<NaiveDateTime> {
        Some(self.due)
    }

    fn operation(&self) -> Option<&str> {
        self.delivery_operation.as_deref()
    }

    fn quantity(&self) -> f64 {
        self.quantity
    }

    fn policy(&self) -> DemandPolicy {
        DemandPolicy::default()
    }

    fn set_quantity(&mut self, quantity: f64) -> ForecastResult<()> {
        self.quantity = quantity;
        Ok(())
    }

    fn set_due(&mut self, due: NaiveDateTime) -> ForecastResult<()> {
        self.due = due;
        Ok(())
    }
}

// ==========================================
// 冲减台账
// ==========================================

/// 单个分桶的扣减（或恢复）量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketConsumption {
    pub bucket_start: NaiveDateTime,
    pub quantity: f64,
}

/// 订单某个版本实际冲减的分桶数量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAllocation {
    pub order_id: String,
    /// 被冲减的预测（None 表示当时没有匹配）
    pub forecast: Option<String>,
    pub consumptions: Vec<BucketConsumption>,
}

impl OrderAllocation {
    pub fn total(&self) -> f64 {
        self.consumptions.iter().map(|c| c.quantity).sum()
    }
}

// ==========================================
// OrderBook - 订单簿
// ==========================================
#[derive(Debug, Default)]
pub struct OrderBook {
    orders: BTreeMap<String, CustomerOrder>,
    pending: BTreeSet<String>,
    /// 在册订单最近一次冲减的台账（修改后仍保留，直到重新冲减前回退）
    allocations: BTreeMap<String, OrderAllocation>,
    /// 已删除订单的台账，等待回退
    retired: Vec<OrderAllocation>,
    next_sequence: u64,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新增订单，分配创建序号并标记待冲减
    pub fn insert(&mut self, mut order: CustomerOrder) -> ForecastResult<CustomerOrder> {
        if self.orders.contains_key(&order.id) {
            return Err(ForecastError::DuplicateOrder(order.id));
        }
        self.next_sequence += 1;
        order.sequence = self.next_sequence;
        self.pending.insert(order.id.clone());
        self.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    /// 替换订单内容（保留创建序号与旧版本台账）
    ///
    /// # 返回
    /// (修改前, 修改后)
    pub fn replace(
        &mut self,
        mut order: CustomerOrder,
    ) -> ForecastResult<(CustomerOrder, CustomerOrder)> {
        let slot = self
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| ForecastError::OrderNotFound(order.id.clone()))?;
        order.sequence = slot.sequence;
        let before = std::mem::replace(slot, order.clone());
        self.pending.insert(order.id.clone());
        Ok((before, order))
    }

    /// 删除订单；已冲减的台账转入待回退列表
    pub fn remove(&mut self, id: &str) -> ForecastResult<CustomerOrder> {
        let order = self
            .orders
            .remove(id)
            .ok_or_else(|| ForecastError::OrderNotFound(id.to_string()))?;
        self.pending.remove(id);
        if let Some(allocation) = self.allocations.remove(id) {
            self.retired.push(allocation);
        }
        Ok(order)
    }

    pub fn get(&self, id: &str) -> Option<&CustomerOrder> {
        self.orders.get(id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CustomerOrder> {
        self.orders.values()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    /// 记录订单当前版本的冲减台账，并清除待冲减标记
    pub fn record_allocation(&mut self, allocation: OrderAllocation) {
        self.pending.remove(&allocation.order_id);
        self.allocations
            .insert(allocation.order_id.clone(), allocation);
    }

    pub fn allocation(&self, id: &str) -> Option<&OrderAllocation> {
        self.allocations.get(id)
    }

    /// 取出在册订单的台账（重新冲减前回退用）
    pub fn take_allocation(&mut self, id: &str) -> Option<OrderAllocation> {
        self.allocations.remove(id)
    }

    /// 取出已删除订单的台账
    pub fn take_retired(&mut self, id: &str) -> Option<OrderAllocation> {
        let idx = self.retired.iter().position(|a| a.order_id == id)?;
        Some(self.retired.remove(idx))
    }

    /// 取出全部已删除订单的台账
    pub fn drain_retired(&mut self) -> Vec<OrderAllocation> {
        std::mem::take(&mut self.retired)
    }

    /// 待冲减订单，按 交期 → 优先级 → 创建序号 排序
    pub fn pending_orders(&self) -> Vec<CustomerOrder> {
        let mut orders: Vec<CustomerOrder> = self
            .pending
            .iter()
            .filter_map(|id| self.orders.get(id))
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            a.due
                .cmp(&b.due)
                .then(a.priority.cmp(&b.priority))
                .then(a.sequence.cmp(&b.sequence))
        });
        orders
    }
}
