// ==========================================
// 需求预测冲减模块 - 物料/客户层级
// ==========================================
// 用途: 订单找不到直接匹配的预测时，沿层级向上回退
// 约定: 层级最顶端之上还有一个"通配"层（None）
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ==========================================
// Hierarchy - 名称 → 父节点
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hierarchy {
    parents: HashMap<String, Option<String>>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记节点及其父节点（重复登记覆盖父节点）
    pub fn add(&mut self, name: impl Into<String>, parent: Option<&str>) {
        let name = name.into();
        if let Some(p) = parent {
            self.parents.entry(p.to_string()).or_insert(None);
        }
        self.parents.insert(name, parent.map(str::to_string));
    }

    /// 父节点（未登记或为根时返回 None）
    pub fn parent_of(&self, name: &str) -> Option<&str> {
        self.parents.get(name).and_then(|p| p.as_deref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parents.contains_key(name)
    }

    /// 全部节点 (名称, 父节点)，按名称排序
    pub fn entries(&self) -> Vec<(&str, Option<&str>)> {
        let mut entries: Vec<_> = self
            .parents
            .iter()
            .map(|(name, parent)| (name.as_str(), parent.as_deref()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// 自下而上的层级序列: 自身, 父, ..., 根, None
    ///
    /// 遇到环时截断
    pub fn levels(&self, start: Option<&str>) -> Vec<Option<String>> {
        let mut levels = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = start;
        while let Some(name) = cursor {
            if !seen.insert(name) {
                tracing::warn!(node = name, "层级存在环，停止向上回退");
                break;
            }
            levels.push(Some(name.to_string()));
            cursor = self.parent_of(name);
        }
        levels.push(None);
        levels
    }
}

// ==========================================
// Hierarchies - 物料层级 + 客户层级
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hierarchies {
    pub items: Hierarchy,
    pub customers: Hierarchy,
}

impl Hierarchies {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_walk_to_wildcard() {
        let mut h = Hierarchy::new();
        h.add("BOLT-M8", Some("BOLTS"));
        h.add("BOLTS", Some("FASTENERS"));

        let levels = h.levels(Some("BOLT-M8"));
        assert_eq!(
            levels,
            vec![
                Some("BOLT-M8".to_string()),
                Some("BOLTS".to_string()),
                Some("FASTENERS".to_string()),
                None
            ]
        );
        assert!(h.contains("FASTENERS"));
        assert_eq!(
            h.entries(),
            vec![
                ("BOLT-M8", Some("BOLTS")),
                ("BOLTS", Some("FASTENERS")),
                ("FASTENERS", None)
            ]
        );
    }

    #[test]
    fn test_unknown_node_is_its_own_root() {
        let h = Hierarchy::new();
        assert_eq!(h.levels(Some("X")), vec![Some("X".to_string()), None]);
        assert_eq!(h.levels(None), vec![None]);
    }

    #[test]
    fn test_cycle_is_truncated() {
        let mut h = Hierarchy::new();
        h.add("A", Some("B"));
        h.add("B", Some("A"));
        let levels = h.levels(Some("A"));
        assert_eq!(levels.len(), 3); // A, B, None
    }
}
