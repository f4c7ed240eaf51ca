// ==========================================
// 需求预测冲减模块 - 计划上下文
// ==========================================
// 职责: 持有模块参数、层级、日历、预测仓储、订单簿、冲减求解器
// 职责: 订单变更 → 通知订阅的求解器；日历删除 → 询问删除守卫
// 并发: 单线程同步；跨线程使用时包成 SharedContext，
//       查询与修改在同一把锁内完成
// ==========================================

use crate::config::ForecastConfig;
use crate::domain::calendar::BucketCalendar;
use crate::domain::error::{ForecastError, ForecastResult};
use crate::domain::forecast::Forecast;
use crate::domain::hierarchy::Hierarchies;
use crate::domain::order::{CustomerOrder, OrderBook};
use crate::domain::record::ForecastSnapshot;
use crate::engine::events::{dispatch, NoOpOrderObserver, OrderChangeObserver, OrderEvent};
use crate::engine::netting::{ForecastSolver, NettingOutcome};
use crate::repository::{
    CalendarDeletionGuard, CalendarRegistry, ForecastRepository, ForecastStore, RepositoryError,
    RepositoryResult,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::instrument;

/// 默认求解器名称
pub const DEFAULT_SOLVER_NAME: &str = "forecast-netting";

/// 跨线程共享的计划上下文
pub type SharedContext = Arc<Mutex<PlanningContext>>;

/// 获取共享上下文的锁
pub fn lock_context(ctx: &SharedContext) -> RepositoryResult<MutexGuard<'_, PlanningContext>> {
    ctx.lock()
        .map_err(|e| RepositoryError::LockError(e.to_string()))
}

// ==========================================
// PlanningContext
// ==========================================
#[derive(Debug)]
pub struct PlanningContext {
    config: ForecastConfig,
    hierarchies: Hierarchies,
    calendars: CalendarRegistry,
    forecasts: ForecastRepository,
    orders: OrderBook,
    solver: ForecastSolver,
}

impl PlanningContext {
    pub fn new(config: ForecastConfig) -> Self {
        Self {
            config,
            hierarchies: Hierarchies::new(),
            calendars: CalendarRegistry::new(),
            forecasts: ForecastRepository::new(),
            orders: OrderBook::new(),
            solver: ForecastSolver::new(DEFAULT_SOLVER_NAME),
        }
    }

    pub fn into_shared(self) -> SharedContext {
        Arc::new(Mutex::new(self))
    }

    // ===== 访问器 =====

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ForecastConfig) {
        self.config = config;
    }

    pub fn hierarchies(&self) -> &Hierarchies {
        &self.hierarchies
    }

    pub fn hierarchies_mut(&mut self) -> &mut Hierarchies {
        &mut self.hierarchies
    }

    pub fn calendars(&self) -> &CalendarRegistry {
        &self.calendars
    }

    pub fn forecasts(&self) -> &ForecastRepository {
        &self.forecasts
    }

    pub fn forecasts_mut(&mut self) -> &mut ForecastRepository {
        &mut self.forecasts
    }

    pub fn orders(&self) -> &OrderBook {
        &self.orders
    }

    pub fn solver(&self) -> &ForecastSolver {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut ForecastSolver {
        &mut self.solver
    }

    // ==========================================
    // 日历
    // ==========================================

    pub fn register_calendar(
        &mut self,
        calendar: impl BucketCalendar + 'static,
    ) -> Arc<dyn BucketCalendar> {
        self.calendars.register(calendar)
    }

    /// 删除日历（被预测引用时拒绝）
    pub fn delete_calendar(&mut self, name: &str) -> ForecastResult<()> {
        let guards: [&dyn CalendarDeletionGuard; 1] = [&self.forecasts];
        self.calendars.remove(name, &guards)?;
        tracing::info!(calendar = name, "日历已删除");
        Ok(())
    }

    // ==========================================
    // 预测
    // ==========================================

    /// 创建预测（使用模块默认计划期）
    pub fn create_forecast(
        &mut self,
        name: &str,
        item: Option<&str>,
        customer: Option<&str>,
    ) -> ForecastResult<&mut Forecast> {
        let horizon = self.config.horizon;
        self.forecasts.create_forecast(name, item, customer, horizon)
    }

    /// 为预测设置已登记的日历
    pub fn assign_calendar(&mut self, forecast: &str, calendar: &str) -> ForecastResult<()> {
        let calendar = self.calendars.get(calendar)?;
        self.forecasts.require_mut(forecast)?.set_calendar(calendar)
    }

    pub fn remove_forecast(&mut self, name: &str) -> ForecastResult<Forecast> {
        self.forecasts.remove(name)
    }

    // ==========================================
    // 订单生命周期
    // ==========================================

    /// 新增订单
    pub fn add_order(&mut self, order: CustomerOrder) -> ForecastResult<Vec<NettingOutcome>> {
        let order = self.orders.insert(order)?;
        self.publish(OrderEvent::Created(order))
    }

    /// 修改订单（按 id 替换）
    pub fn modify_order(&mut self, order: CustomerOrder) -> ForecastResult<Vec<NettingOutcome>> {
        let (before, after) = self.orders.replace(order)?;
        self.publish(OrderEvent::Modified { before, after })
    }

    /// 删除订单
    pub fn delete_order(&mut self, id: &str) -> ForecastResult<Vec<NettingOutcome>> {
        let order = self.orders.remove(id)?;
        self.publish(OrderEvent::Deleted(order))
    }

    /// 发布订单事件：自动模式交给求解器，手动模式留待批量冲减
    fn publish(&mut self, event: OrderEvent) -> ForecastResult<Vec<NettingOutcome>> {
        let observer: &dyn OrderChangeObserver = if self.solver.is_automatic() {
            &self.solver
        } else {
            &NoOpOrderObserver
        };
        dispatch(
            observer,
            &event,
            &mut self.forecasts,
            &self.hierarchies,
            &self.config,
            &mut self.orders,
        )
    }

    // ==========================================
    // 冲减
    // ==========================================

    /// 批量冲减全部待处理订单
    #[instrument(skip(self), fields(pending = self.orders.pending_orders().len()))]
    pub fn run_netting(&mut self) -> ForecastResult<Vec<NettingOutcome>> {
        self.solver.solve_all(
            &mut self.forecasts,
            &self.hierarchies,
            &self.config,
            &mut self.orders,
        )
    }

    // ==========================================
    // 快照与持久化
    // ==========================================

    pub fn snapshot(&self) -> ForecastSnapshot {
        ForecastSnapshot {
            forecasts: self.forecasts.to_records(),
            solver: Some(self.solver.to_record()),
            hierarchies: Some(self.hierarchies.clone()),
        }
    }

    /// 应用快照（按记录创建或更新预测）
    ///
    /// 全部记录在副本上应用，任一记录失败则仓储保持原样
    pub fn apply_snapshot(&mut self, snapshot: &ForecastSnapshot) -> ForecastResult<()> {
        let mut working = self.forecasts.clone();
        for record in &snapshot.forecasts {
            working.apply_record(record, &self.calendars, self.config.horizon)?;
        }
        self.forecasts = working;
        if let Some(hierarchies) = &snapshot.hierarchies {
            self.hierarchies = hierarchies.clone();
        }
        if let Some(solver) = &snapshot.solver {
            self.solver = ForecastSolver::from_record(solver);
        }
        Ok(())
    }

    /// 保存到 SQLite
    pub fn save(&self, store: &ForecastStore) -> RepositoryResult<()> {
        store.save_records(&self.forecasts.to_records())?;
        store.save_hierarchies(&self.hierarchies)?;
        store.save_solver(&self.solver.to_record())?;
        Ok(())
    }

    /// 从 SQLite 加载（日历需事先登记）
    pub fn load(&mut self, store: &ForecastStore) -> RepositoryResult<usize> {
        let snapshot = ForecastSnapshot {
            forecasts: store.load_records()?,
            solver: store.load_solver()?,
            hierarchies: Some(store.load_hierarchies()?),
        };
        self.apply_snapshot(&snapshot)?;
        tracing::info!(forecast_count = snapshot.forecasts.len(), "预测已从数据库加载");
        Ok(snapshot.forecasts.len())
    }

    /// 订单 id 对应的订单（不存在返回 OrderNotFound）
    pub fn require_order(&self, id: &str) -> ForecastResult<&CustomerOrder> {
        self.orders
            .get(id)
            .ok_or_else(|| ForecastError::OrderNotFound(id.to_string()))
    }
}

impl Default for PlanningContext {
    fn default() -> Self {
        Self::new(ForecastConfig::default())
    }
}
