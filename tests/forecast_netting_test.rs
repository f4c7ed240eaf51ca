// ==========================================
// 冲减求解器集成测试
// ==========================================
// 测试目标: 层级回退、冲减截断、重复冲减、字典一致性、
//           自动/手动回调、日历删除守卫、批量冲减顺序、
//           订单修改/删除的台账回退、快照应用失败不留半成品
// ==========================================

mod test_helpers;

use forecast_netting::domain::{Demand, ForecastError, ForecastRecord, ForecastSnapshot};
use forecast_netting::engine::{lock_context, PlanningContext};
use forecast_netting::ForecastConfig;
use std::thread;
use test_helpers::{add_weekly_forecast, approx, dt, order, test_horizon, weekly_context};

#[test]
fn test_hierarchy_fallback_to_parent_item() {
    let mut ctx = weekly_context();
    ctx.hierarchies_mut().items.add("A", Some("P"));
    add_weekly_forecast(&mut ctx, "F-parent", Some("P"), None, "PLANLATE", 50.0);

    // 试算不影响上下文中的仓储
    let mut trial = ctx.forecasts().clone();
    let outcome = ctx
        .solver()
        .solve_order(
            &mut trial,
            ctx.hierarchies(),
            ctx.config(),
            &order("O1", "A", Some("X"), 10.0, dt(1, 14)),
        )
        .unwrap();
    assert_eq!(outcome.forecast.as_deref(), Some("F-parent"));
    assert!(approx(ctx.forecasts().get("F-parent").unwrap().quantity(), 200.0));

    ctx.add_order(order("O1", "A", Some("X"), 10.0, dt(1, 14)))
        .unwrap();
    let outcomes = ctx.run_netting().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].forecast.as_deref(), Some("F-parent"));
    let f = ctx.forecasts().get("F-parent").unwrap();
    assert!(approx(f.buckets()[1].net(), 40.0));
}

#[test]
fn test_unmatched_order_is_soft_outcome() {
    let mut ctx = weekly_context();
    add_weekly_forecast(&mut ctx, "F1", Some("A"), None, "PLANLATE", 50.0);

    ctx.add_order(order("O1", "B", None, 10.0, dt(1, 14))).unwrap();
    let outcomes = ctx.run_netting().unwrap();

    assert!(!outcomes[0].is_matched());
    assert!(approx(outcomes[0].unnetted, 10.0));
    assert!(approx(ctx.forecasts().get("F1").unwrap().quantity(), 200.0));
}

#[test]
fn test_plan_short_clamps_at_zero() {
    let mut ctx = weekly_context();
    add_weekly_forecast(&mut ctx, "F1", Some("A"), Some("X"), "PLANSHORT", 100.0);

    ctx.add_order(order("O1", "A", Some("X"), 150.0, dt(1, 14)))
        .unwrap();
    let outcomes = ctx.run_netting().unwrap();

    assert!(approx(outcomes[0].netted, 100.0));
    assert!(approx(outcomes[0].unnetted, 50.0));
    let f = ctx.forecasts().get("F1").unwrap();
    assert!(f.buckets().iter().all(|b| b.net() >= 0.0));
    assert!(approx(f.buckets()[1].net(), 0.0));
}

#[test]
fn test_solving_same_order_twice_nets_twice() {
    let mut ctx = weekly_context();
    add_weekly_forecast(&mut ctx, "F1", Some("A"), None, "PLANLATE", 100.0);
    let o = order("O1", "A", None, 30.0, dt(1, 14));

    let mut repo = ctx.forecasts().clone();
    let solver = ctx.solver().clone();
    solver
        .solve_order(&mut repo, ctx.hierarchies(), ctx.config(), &o)
        .unwrap();
    solver
        .solve_order(&mut repo, ctx.hierarchies(), ctx.config(), &o)
        .unwrap();

    assert!(approx(repo.get("F1").unwrap().buckets()[1].net(), 40.0));
}

#[test]
fn test_batch_order_follows_due_then_priority() {
    let mut ctx = weekly_context();
    add_weekly_forecast(&mut ctx, "F1", Some("A"), None, "PLANSHORT", 100.0);

    ctx.add_order(order("late", "A", None, 80.0, dt(1, 15)))
        .unwrap();
    ctx.add_order(order("low", "A", None, 80.0, dt(1, 13)).with_priority(5))
        .unwrap();
    ctx.add_order(order("high", "A", None, 80.0, dt(1, 13)).with_priority(1))
        .unwrap();

    let outcomes = ctx.run_netting().unwrap();
    let ids: Vec<&str> = outcomes.iter().map(|o| o.order_id.as_str()).collect();
    assert_eq!(ids, vec!["high", "low", "late"]);
    assert!(approx(outcomes[0].netted, 80.0));
    assert!(approx(outcomes[1].netted, 20.0));
    assert!(approx(outcomes[2].netted, 0.0));

    // 已处理的订单不再重复冲减
    assert!(ctx.run_netting().unwrap().is_empty());
}

#[test]
fn test_dictionary_consistent_after_rekey() {
    let mut ctx = weekly_context();
    add_weekly_forecast(&mut ctx, "F1", Some("A"), Some("X"), "PLANLATE", 10.0);

    ctx.forecasts_mut().set_item("F1", Some("B")).unwrap();
    ctx.forecasts_mut().set_customer("F1", None).unwrap();

    assert!(ctx.forecasts().lookup(Some("A"), Some("X")).is_empty());
    let found = ctx.forecasts().lookup(Some("B"), None);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name(), "F1");
    assert!(ctx
        .forecasts()
        .get("F1")
        .unwrap()
        .buckets()
        .iter()
        .all(|b| b.item() == Some("B") && b.customer().is_none()));

    assert!(matches!(
        ctx.forecasts_mut().set_item("nope", Some("A")),
        Err(ForecastError::ForecastNotFound(_))
    ));
}

#[test]
fn test_automatic_solver_nets_and_reverses_on_order_changes() {
    let mut ctx = weekly_context();
    add_weekly_forecast(&mut ctx, "F1", Some("A"), None, "PLANLATE", 100.0);
    ctx.solver_mut().set_automatic(true);

    let created = ctx.add_order(order("O1", "A", None, 30.0, dt(1, 14))).unwrap();
    assert_eq!(created.len(), 1);
    assert!(!ctx.orders().is_pending("O1"));
    assert!(approx(ctx.forecasts().get("F1").unwrap().quantity(), 370.0));

    // 修改: 回退 30 再冲减 120（跨两个分桶）
    let modified = ctx
        .modify_order(order("O1", "A", None, 120.0, dt(1, 14)))
        .unwrap();
    assert_eq!(modified.len(), 2);
    let f = ctx.forecasts().get("F1").unwrap();
    assert!(approx(f.quantity(), 280.0));
    assert!(approx(f.buckets()[1].net(), 0.0));
    assert!(approx(f.buckets()[2].net(), 80.0));

    ctx.delete_order("O1").unwrap();
    assert!(approx(ctx.forecasts().get("F1").unwrap().quantity(), 400.0));
    assert!(matches!(
        ctx.delete_order("O1"),
        Err(ForecastError::OrderNotFound(_))
    ));
}

#[test]
fn test_manual_solver_ignores_order_changes() {
    let mut ctx = weekly_context();
    add_weekly_forecast(&mut ctx, "F1", Some("A"), None, "PLANLATE", 100.0);

    let outcomes = ctx.add_order(order("O1", "A", None, 30.0, dt(1, 14))).unwrap();
    assert!(outcomes.is_empty());
    assert!(ctx.orders().is_pending("O1"));
    assert!(approx(ctx.forecasts().get("F1").unwrap().quantity(), 400.0));

    ctx.run_netting().unwrap();
    assert!(approx(ctx.forecasts().get("F1").unwrap().quantity(), 370.0));
}

#[test]
fn test_deleting_pending_order_after_switch_keeps_other_consumption() {
    let mut ctx = weekly_context();
    add_weekly_forecast(&mut ctx, "F1", Some("A"), None, "PLANLATE", 100.0);

    ctx.add_order(order("O2", "A", None, 50.0, dt(1, 14))).unwrap();
    ctx.run_netting().unwrap();
    assert!(approx(ctx.forecasts().get("F1").unwrap().quantity(), 350.0));

    // O1 在手动模式下登记，从未冲减
    ctx.add_order(order("O1", "A", None, 30.0, dt(1, 14))).unwrap();
    ctx.solver_mut().set_automatic(true);
    let outcomes = ctx.delete_order("O1").unwrap();

    assert!(outcomes.is_empty());
    let f = ctx.forecasts().get("F1").unwrap();
    assert!(approx(f.quantity(), 350.0));
    assert!(approx(f.buckets()[1].net(), 50.0));
    assert!(ctx.orders().allocation("O2").is_some());
}

#[test]
fn test_manual_modify_renets_without_double_counting() {
    let mut ctx = weekly_context();
    add_weekly_forecast(&mut ctx, "F1", Some("A"), None, "PLANLATE", 100.0);

    ctx.add_order(order("O1", "A", None, 50.0, dt(1, 14))).unwrap();
    ctx.run_netting().unwrap();
    assert!(approx(ctx.forecasts().get("F1").unwrap().quantity(), 350.0));

    let outcomes = ctx
        .modify_order(order("O1", "A", None, 60.0, dt(1, 14)))
        .unwrap();
    assert!(outcomes.is_empty());
    assert!(ctx.orders().is_pending("O1"));
    assert!(approx(ctx.forecasts().get("F1").unwrap().quantity(), 350.0));

    let outcomes = ctx.run_netting().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(approx(outcomes[0].netted, 60.0));
    let f = ctx.forecasts().get("F1").unwrap();
    assert!(approx(f.quantity(), 340.0));
    assert!(approx(f.buckets()[1].net(), 40.0));
    assert!(approx(ctx.orders().allocation("O1").unwrap().total(), 60.0));
}

#[test]
fn test_manual_delete_is_reversed_in_next_batch() {
    let mut ctx = weekly_context();
    add_weekly_forecast(&mut ctx, "F1", Some("A"), None, "PLANLATE", 100.0);

    ctx.add_order(order("O1", "A", None, 50.0, dt(1, 14))).unwrap();
    ctx.add_order(order("O2", "A", None, 70.0, dt(1, 14))).unwrap();
    ctx.run_netting().unwrap();
    assert!(approx(ctx.forecasts().get("F1").unwrap().quantity(), 280.0));

    // 手动模式: 删除只登记，下一次批量冲减时回退
    assert!(ctx.delete_order("O1").unwrap().is_empty());
    assert!(approx(ctx.forecasts().get("F1").unwrap().quantity(), 280.0));

    assert!(ctx.run_netting().unwrap().is_empty());
    let f = ctx.forecasts().get("F1").unwrap();
    assert!(approx(f.quantity(), 330.0));
    // O2 的扣减 (第二周 50 + 第三周 20) 保持不变
    assert!(approx(f.buckets()[1].net(), 50.0));
    assert!(approx(f.buckets()[2].net(), 80.0));
}

#[test]
fn test_order_netted_automatically_then_deleted_in_manual_mode() {
    let mut ctx = weekly_context();
    add_weekly_forecast(&mut ctx, "F1", Some("A"), None, "PLANLATE", 100.0);
    ctx.solver_mut().set_automatic(true);
    ctx.add_order(order("O1", "A", None, 30.0, dt(1, 14))).unwrap();

    ctx.solver_mut().set_automatic(false);
    ctx.delete_order("O1").unwrap();
    assert!(approx(ctx.forecasts().get("F1").unwrap().quantity(), 370.0));

    ctx.run_netting().unwrap();
    assert!(approx(ctx.forecasts().get("F1").unwrap().quantity(), 400.0));
}

fn record(name: &str, item: &str, calendar: &str, priority: i32) -> ForecastRecord {
    ForecastRecord {
        name: name.to_string(),
        item: Some(item.to_string()),
        customer: None,
        calendar: Some(calendar.to_string()),
        priority,
        policy: Default::default(),
        operation: None,
        buckets: Vec::new(),
    }
}

#[test]
fn test_failed_record_leaves_forecast_unchanged() {
    let mut ctx = weekly_context();
    add_weekly_forecast(&mut ctx, "F1", Some("A"), None, "PLANLATE", 100.0);

    let snapshot = ForecastSnapshot {
        forecasts: vec![record("F1", "B", "missing", 0)],
        ..Default::default()
    };
    let result = ctx.apply_snapshot(&snapshot);
    assert!(matches!(result, Err(ForecastError::CalendarNotFound(_))));

    assert_eq!(ctx.forecasts().lookup(Some("A"), None).len(), 1);
    assert!(ctx.forecasts().lookup(Some("B"), None).is_empty());
    let f = ctx.forecasts().get("F1").unwrap();
    assert_eq!(f.item(), Some("A"));
    assert!(f.buckets().iter().all(|b| b.item() == Some("A")));
}

#[test]
fn test_failed_snapshot_leaves_repository_unchanged() {
    let mut ctx = weekly_context();
    add_weekly_forecast(&mut ctx, "F1", Some("A"), None, "PLANLATE", 100.0);

    let snapshot = ForecastSnapshot {
        forecasts: vec![
            record("F1", "A", "weeks", 7),
            record("F2", "B", "missing", 0),
        ],
        ..Default::default()
    };
    assert!(ctx.apply_snapshot(&snapshot).is_err());

    assert_eq!(ctx.forecasts().len(), 1);
    assert_eq!(ctx.forecasts().get("F1").unwrap().priority(), 0);
    assert!(ctx.forecasts().get("F2").is_none());
}

#[test]
fn test_calendar_in_use_cannot_be_deleted() {
    let mut ctx = weekly_context();
    add_weekly_forecast(&mut ctx, "F1", Some("A"), None, "PLANLATE", 10.0);

    let err = ctx.delete_calendar("weeks").unwrap_err();
    assert_eq!(
        err,
        ForecastError::CalendarInUse {
            calendar: "weeks".to_string(),
            forecast: "F1".to_string(),
        }
    );
    assert!(ctx.calendars().get("weeks").is_ok());

    ctx.remove_forecast("F1").unwrap();
    ctx.delete_calendar("weeks").unwrap();
    assert!(ctx.forecasts().lookup(Some("A"), None).is_empty());
}

#[test]
fn test_shared_context_serializes_netting_across_threads() {
    forecast_netting::logging::init_test();
    let mut ctx = PlanningContext::new(ForecastConfig::default().with_horizon(test_horizon()));
    ctx.register_calendar(test_helpers::weekly_calendar());
    add_weekly_forecast(&mut ctx, "F1", Some("A"), None, "PLANSHORT", 100.0);
    ctx.solver_mut().set_automatic(true);
    let shared = ctx.into_shared();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let shared = shared.clone();
            thread::spawn(move || {
                let mut ctx = lock_context(&shared).unwrap();
                ctx.add_order(order(&format!("O{}", i), "A", None, 40.0, dt(1, 14)))
                    .unwrap()
            })
        })
        .collect();

    let netted: f64 = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .map(|o| o.netted)
        .sum();
    assert!(approx(netted, 100.0));

    let ctx = lock_context(&shared).unwrap();
    assert!(approx(ctx.forecasts().get("F1").unwrap().buckets()[1].net(), 0.0));
}
