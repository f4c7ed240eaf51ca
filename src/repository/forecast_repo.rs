// ==========================================
// 需求预测冲减模块 - 预测仓储（内存）
// ==========================================
// 职责: 持有全部预测 + (物料, 客户) → 预测 的多值有序字典
// 红线: 字典只由本仓储修改（创建 / 删除 / 改物料 / 改客户）
// 生命周期: 由 PlanningContext 持有，以引用方式传给求解器
// ==========================================

use crate::domain::demand::Demand;
use crate::domain::error::{ForecastError, ForecastResult};
use crate::domain::forecast::Forecast;
use crate::domain::record::ForecastRecord;
use crate::domain::time::DateRange;
use crate::repository::calendar_registry::{CalendarDeletionGuard, CalendarRegistry};
use std::collections::BTreeMap;
use std::sync::Arc;

// ==========================================
// ForecastKey - 字典键
// ==========================================
// 排序: 同一物料的全部客户相邻（None 排在最前），支持按物料范围查找
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ForecastKey {
    pub item: Option<String>,
    pub customer: Option<String>,
}

impl ForecastKey {
    pub fn new(item: Option<&str>, customer: Option<&str>) -> Self {
        Self {
            item: item.map(str::to_string),
            customer: customer.map(str::to_string),
        }
    }

    fn of(forecast: &Forecast) -> Self {
        Self::new(forecast.item(), forecast.customer())
    }
}

// ==========================================
// ForecastRepository
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ForecastRepository {
    forecasts: BTreeMap<String, Forecast>,
    dictionary: BTreeMap<ForecastKey, Vec<String>>,
}

impl ForecastRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.forecasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forecasts.is_empty()
    }

    // ==========================================
    // 增删
    // ==========================================

    /// 登记预测并写入字典
    pub fn insert(&mut self, forecast: Forecast) -> ForecastResult<()> {
        if self.forecasts.contains_key(forecast.name()) {
            return Err(ForecastError::DuplicateForecast(forecast.name().to_string()));
        }
        let key = ForecastKey::of(&forecast);
        let name = forecast.name().to_string();
        self.dictionary.entry(key).or_default().push(name.clone());
        self.forecasts.insert(name, forecast);
        Ok(())
    }

    /// 创建并登记预测
    pub fn create_forecast(
        &mut self,
        name: &str,
        item: Option<&str>,
        customer: Option<&str>,
        horizon: DateRange,
    ) -> ForecastResult<&mut Forecast> {
        self.insert(Forecast::new(name, item, customer, horizon))?;
        tracing::info!(forecast = name, item = ?item, customer = ?customer, "预测已创建");
        self.require_mut(name)
    }

    /// 删除预测，同时移除字典条目
    pub fn remove(&mut self, name: &str) -> ForecastResult<Forecast> {
        let forecast = self
            .forecasts
            .remove(name)
            .ok_or_else(|| ForecastError::ForecastNotFound(name.to_string()))?;
        self.unlink(&ForecastKey::of(&forecast), name);
        tracing::info!(forecast = name, "预测已删除");
        Ok(forecast)
    }

    fn unlink(&mut self, key: &ForecastKey, name: &str) {
        if let Some(names) = self.dictionary.get_mut(key) {
            names.retain(|n| n != name);
            if names.is_empty() {
                self.dictionary.remove(key);
            }
        }
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn get(&self, name: &str) -> Option<&Forecast> {
        self.forecasts.get(name)
    }

    /// 可变访问（物料/客户只能经由 set_item / set_customer 修改）
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Forecast> {
        self.forecasts.get_mut(name)
    }

    pub fn require(&self, name: &str) -> ForecastResult<&Forecast> {
        self.get(name)
            .ok_or_else(|| ForecastError::ForecastNotFound(name.to_string()))
    }

    pub fn require_mut(&mut self, name: &str) -> ForecastResult<&mut Forecast> {
        self.forecasts
            .get_mut(name)
            .ok_or_else(|| ForecastError::ForecastNotFound(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Forecast> {
        self.forecasts.values()
    }

    /// 精确查找（按登记顺序）
    pub fn lookup(&self, item: Option<&str>, customer: Option<&str>) -> Vec<&Forecast> {
        self.dictionary
            .get(&ForecastKey::new(item, customer))
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| self.forecasts.get(n))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 按物料查找（客户通配）
    pub fn find_by_item(&self, item: &str) -> Vec<&Forecast> {
        let from = ForecastKey::new(Some(item), None);
        self.dictionary
            .range(from..)
            .take_while(|(key, _)| key.item.as_deref() == Some(item))
            .flat_map(|(_, names)| names.iter())
            .filter_map(|n| self.forecasts.get(n))
            .collect()
    }

    /// 对外需求列表（不含隐藏分桶）
    pub fn demands(&self) -> Vec<&dyn Demand> {
        self.forecasts
            .values()
            .map(|f| f as &dyn Demand)
            .filter(|d| !d.is_hidden())
            .collect()
    }

    /// 全部需求（含隐藏分桶）
    pub fn all_demands(&self) -> Vec<&dyn Demand> {
        let mut demands: Vec<&dyn Demand> = Vec::new();
        for f in self.forecasts.values() {
            demands.push(f);
            demands.extend(f.buckets().iter().map(|b| b as &dyn Demand));
        }
        demands
    }

    // ==========================================
    // 字典键变更
    // ==========================================

    /// 修改物料：旧键移除、字段修改、新键写入在同一次可变借用内完成
    pub fn set_item(&mut self, name: &str, item: Option<&str>) -> ForecastResult<()> {
        let forecast = self
            .forecasts
            .get_mut(name)
            .ok_or_else(|| ForecastError::ForecastNotFound(name.to_string()))?;
        let old_key = ForecastKey::of(forecast);
        forecast.set_item(item);
        let new_key = ForecastKey::of(forecast);

        self.unlink(&old_key, name);
        self.dictionary
            .entry(new_key)
            .or_default()
            .push(name.to_string());
        tracing::debug!(forecast = name, item = ?item, "预测物料已修改");
        Ok(())
    }

    /// 修改客户（同 set_item）
    pub fn set_customer(&mut self, name: &str, customer: Option<&str>) -> ForecastResult<()> {
        let forecast = self
            .forecasts
            .get_mut(name)
            .ok_or_else(|| ForecastError::ForecastNotFound(name.to_string()))?;
        let old_key = ForecastKey::of(forecast);
        forecast.set_customer(customer);
        let new_key = ForecastKey::of(forecast);

        self.unlink(&old_key, name);
        self.dictionary
            .entry(new_key)
            .or_default()
            .push(name.to_string());
        tracing::debug!(forecast = name, customer = ?customer, "预测客户已修改");
        Ok(())
    }

    // ==========================================
    // 记录导入/导出
    // ==========================================

    pub fn to_records(&self) -> Vec<ForecastRecord> {
        self.forecasts.values().map(Forecast::to_record).collect()
    }

    /// 按记录创建或更新预测
    ///
    /// 规则:
    /// - 分桶记录日期与某个分桶完全一致 → 直接写入该分桶（含剩余数量）
    /// - 只有 start（或 start == end）→ 退化区间写入
    /// - 有 start/end → 按权重分配
    /// - 无日期 → 按顺序对应日历分桶
    ///
    /// 在副本上应用，全部成功后才写回；失败时预测与字典保持原样
    pub fn apply_record(
        &mut self,
        record: &ForecastRecord,
        calendars: &CalendarRegistry,
        horizon: DateRange,
    ) -> ForecastResult<()> {
        let calendar = record
            .calendar
            .as_deref()
            .map(|c| calendars.get(c))
            .transpose()?;

        let mut working = match self.get(&record.name) {
            Some(existing) => existing.clone(),
            None => Forecast::new(&record.name, None, None, horizon),
        };
        working.set_item(record.item.as_deref());
        working.set_customer(record.customer.as_deref());
        working.set_priority(record.priority);
        working.set_operation(record.operation.as_deref());
        working.set_policy(&record.policy.to_string())?;
        if let Some(calendar) = calendar {
            let unchanged = working
                .calendar()
                .map(|current| Arc::ptr_eq(current, &calendar))
                .unwrap_or(false);
            if !unchanged {
                working.set_calendar(calendar)?;
            }
        }

        for (position, bucket) in record.buckets.iter().enumerate() {
            let range = match (bucket.start, bucket.end) {
                (Some(start), Some(end)) => DateRange::new(start, end),
                (Some(at), None) | (None, Some(at)) => DateRange::instant(at),
                (None, None) => match working.buckets().get(position) {
                    Some(b) => b.range(),
                    None => {
                        return Err(ForecastError::validation(
                            record.name.clone(),
                            None,
                            format!("分桶记录 #{} 超出日历分桶数量", position + 1),
                        ))
                    }
                },
            };

            // 与某个分桶完全一致 → 直接写入该分桶
            match working.buckets().iter().position(|b| b.range() == range) {
                Some(idx) => {
                    working.set_quantity_range(DateRange::instant(range.start), bucket.quantity)?;
                    if let Some(net) = bucket.net {
                        working.buckets_mut()[idx].restore_state(bucket.quantity, net);
                    }
                }
                None => working.set_quantity_range(range, bucket.quantity)?,
            }
        }

        self.commit(working);
        Ok(())
    }

    /// 写回预测；键变化时同步字典
    fn commit(&mut self, forecast: Forecast) {
        let name = forecast.name().to_string();
        let new_key = ForecastKey::of(&forecast);
        match self.forecasts.insert(name.clone(), forecast) {
            Some(previous) => {
                let old_key = ForecastKey::of(&previous);
                if old_key != new_key {
                    self.unlink(&old_key, &name);
                    self.dictionary.entry(new_key).or_default().push(name);
                }
            }
            None => self.dictionary.entry(new_key).or_default().push(name),
        }
    }

    /// 第一个引用指定日历的预测
    pub fn forecast_using_calendar(&self, calendar: &str) -> Option<&Forecast> {
        self.forecasts
            .values()
            .find(|f| f.calendar_name() == Some(calendar))
    }
}

impl CalendarDeletionGuard for ForecastRepository {
    fn veto_calendar_deletion(&self, calendar: &str) -> Option<String> {
        self.forecast_using_calendar(calendar)
            .map(|f| f.name().to_string())
    }
}
