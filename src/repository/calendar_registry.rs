// ==========================================
// 需求预测冲减模块 - 日历登记簿
// ==========================================
// 职责: 按名称保存分桶日历；删除前询问删除守卫
// 说明: 守卫为显式注入的观察者，无全局信号总线
// ==========================================

use crate::domain::calendar::BucketCalendar;
use crate::domain::error::{ForecastError, ForecastResult};
use std::collections::BTreeMap;
use std::sync::Arc;

// ==========================================
// Trait: CalendarDeletionGuard
// ==========================================
pub trait CalendarDeletionGuard {
    /// 返回 Some(引用方名称) 表示否决删除
    fn veto_calendar_deletion(&self, calendar: &str) -> Option<String>;
}

// ==========================================
// CalendarRegistry
// ==========================================
#[derive(Debug, Default)]
pub struct CalendarRegistry {
    calendars: BTreeMap<String, Arc<dyn BucketCalendar>>,
}

impl CalendarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记日历（同名覆盖，返回共享引用）
    pub fn register(&mut self, calendar: impl BucketCalendar + 'static) -> Arc<dyn BucketCalendar> {
        let calendar: Arc<dyn BucketCalendar> = Arc::new(calendar);
        self.calendars
            .insert(calendar.name().to_string(), Arc::clone(&calendar));
        calendar
    }

    pub fn get(&self, name: &str) -> ForecastResult<Arc<dyn BucketCalendar>> {
        self.calendars
            .get(name)
            .cloned()
            .ok_or_else(|| ForecastError::CalendarNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.calendars.keys().map(String::as_str)
    }

    /// 删除日历；任一守卫否决则保留日历并返回 CalendarInUse
    pub fn remove(
        &mut self,
        name: &str,
        guards: &[&dyn CalendarDeletionGuard],
    ) -> ForecastResult<Arc<dyn BucketCalendar>> {
        if !self.calendars.contains_key(name) {
            return Err(ForecastError::CalendarNotFound(name.to_string()));
        }
        for guard in guards {
            if let Some(forecast) = guard.veto_calendar_deletion(name) {
                tracing::warn!(calendar = name, forecast = %forecast, "日历删除被否决");
                return Err(ForecastError::CalendarInUse {
                    calendar: name.to_string(),
                    forecast,
                });
            }
        }
        self.calendars
            .remove(name)
            .ok_or_else(|| ForecastError::CalendarNotFound(name.to_string()))
    }
}
