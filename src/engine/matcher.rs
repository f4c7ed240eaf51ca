// ==========================================
// 需求预测冲减模块 - 订单 → 预测匹配
// ==========================================
// 职责: 按 (物料, 客户) 沿层级回退，找到订单应冲减的预测
// 输入: 订单 + 预测仓储 + 层级 + 模块参数
// 输出: 预测引用（找不到不是错误）
// ==========================================

use crate::config::ForecastConfig;
use crate::domain::demand::Demand;
use crate::domain::forecast::Forecast;
use crate::domain::hierarchy::Hierarchies;
use crate::domain::order::CustomerOrder;
use crate::repository::ForecastRepository;

// ==========================================
// ForecastMatcher
// ==========================================
pub struct ForecastMatcher<'a> {
    repo: &'a ForecastRepository,
    hierarchies: &'a Hierarchies,
    config: &'a ForecastConfig,
}

impl<'a> ForecastMatcher<'a> {
    pub fn new(
        repo: &'a ForecastRepository,
        hierarchies: &'a Hierarchies,
        config: &'a ForecastConfig,
    ) -> Self {
        Self {
            repo,
            hierarchies,
            config,
        }
    }

    /// 查找订单对应的预测
    ///
    /// 规则:
    /// - customer_then_item_hierarchy = true: 外层物料、内层客户
    ///   （客户层级先走完，物料上升一级后客户回到订单客户）
    /// - false: 外层客户、内层物料
    /// - 两个维度都以通配层（None）结束
    /// - 每个键下按登记顺序检查候选，交付工序不一致的跳过
    ///
    /// # 返回
    /// - Some(预测): 第一个可接受的预测
    /// - None: 没有匹配
    pub fn match_order(&self, order: &CustomerOrder) -> Option<&'a Forecast> {
        let item_levels = self.hierarchies.items.levels(order.item());
        let customer_levels = self.hierarchies.customers.levels(order.customer());

        let (outer, inner, customer_inner) = if self.config.customer_then_item_hierarchy {
            (&item_levels, &customer_levels, true)
        } else {
            (&customer_levels, &item_levels, false)
        };

        for outer_level in outer {
            for inner_level in inner {
                let (item, customer) = if customer_inner {
                    (outer_level, inner_level)
                } else {
                    (inner_level, outer_level)
                };
                let found = self
                    .repo
                    .lookup(item.as_deref(), customer.as_deref())
                    .into_iter()
                    .find(|f| self.accepts(f, order));
                if let Some(forecast) = found {
                    tracing::debug!(
                        order = %order.id,
                        forecast = forecast.name(),
                        item = ?item,
                        customer = ?customer,
                        "订单已匹配预测"
                    );
                    return Some(forecast);
                }
            }
        }

        tracing::debug!(order = %order.id, "订单没有匹配的预测");
        None
    }

    fn accepts(&self, forecast: &Forecast, order: &CustomerOrder) -> bool {
        !self.config.match_using_delivery_operation || forecast.operation() == order.operation()
    }
}
