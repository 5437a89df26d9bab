//! 入站去重
//!
//! WhatsApp 会在短时间内重投相同内容；同一客户在窗口期内的相同文本只处理一次。

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use super::session::CustomerId;

#[derive(Debug, Clone)]
struct Baseline {
    text: String,
    at: DateTime<Utc>,
}

/// 按客户记录最近一次已处理文本
pub struct Deduplicator {
    window: Duration,
    baselines: Mutex<HashMap<CustomerId, Baseline>>,
}

impl Deduplicator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            baselines: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// 判断是否重复投递。非重复时记录 (text, now) 作为新基线；
    /// 重复时不改动基线，空文本永远不算重复。
    pub fn is_duplicate(&self, customer: &CustomerId, text: &str, now: DateTime<Utc>) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        let mut baselines = self.baselines.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = baselines.get(customer) {
            if prev.text == text && now - prev.at < self.window {
                return true;
            }
        }

        baselines.insert(
            customer.clone(),
            Baseline {
                text: text.to_string(),
                at: now,
            },
        );
        false
    }

    /// 丢弃该客户的基线（运营关闭会话时调用）
    pub fn forget(&self, customer: &CustomerId) -> bool {
        self.baselines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(customer)
            .is_some()
    }

    /// 清理窗口外的基线，返回清理条数
    pub fn purge(&self, now: DateTime<Utc>) -> usize {
        let mut baselines = self.baselines.lock().unwrap_or_else(|e| e.into_inner());
        let before = baselines.len();
        baselines.retain(|_, b| now - b.at < self.window);
        before - baselines.len()
    }

    pub fn len(&self) -> usize {
        self.baselines.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dedup() -> Deduplicator {
        Deduplicator::new(Duration::seconds(90))
    }

    #[test]
    fn test_same_text_within_window_is_duplicate() {
        let d = dedup();
        let id = CustomerId::new("549");
        let t0 = Utc::now();
        assert!(!d.is_duplicate(&id, "Hola", t0));
        assert!(d.is_duplicate(&id, "Hola", t0 + Duration::seconds(5)));
        assert!(d.is_duplicate(&id, "  Hola ", t0 + Duration::seconds(10)));
    }

    #[test]
    fn test_duplicate_does_not_move_baseline() {
        let d = dedup();
        let id = CustomerId::new("549");
        let t0 = Utc::now();
        assert!(!d.is_duplicate(&id, "Hola", t0));
        assert!(d.is_duplicate(&id, "Hola", t0 + Duration::seconds(80)));
        // 基线仍是 t0，因此 t0+95s 已出窗口
        assert!(!d.is_duplicate(&id, "Hola", t0 + Duration::seconds(95)));
    }

    #[test]
    fn test_empty_text_never_duplicate() {
        let d = dedup();
        let id = CustomerId::new("549");
        let t0 = Utc::now();
        assert!(!d.is_duplicate(&id, "", t0));
        assert!(!d.is_duplicate(&id, "   ", t0));
        assert!(d.is_empty());
    }

    #[test]
    fn test_customers_are_independent() {
        let d = dedup();
        let t0 = Utc::now();
        assert!(!d.is_duplicate(&CustomerId::new("1"), "6", t0));
        assert!(!d.is_duplicate(&CustomerId::new("2"), "6", t0));
    }

    #[test]
    fn test_different_text_replaces_baseline() {
        let d = dedup();
        let id = CustomerId::new("549");
        let t0 = Utc::now();
        assert!(!d.is_duplicate(&id, "1", t0));
        assert!(!d.is_duplicate(&id, "2", t0));
        assert!(!d.is_duplicate(&id, "1", t0));
    }

    #[test]
    fn test_forget_clears_only_that_customer() {
        let d = dedup();
        let t0 = Utc::now();
        let a = CustomerId::new("1");
        let b = CustomerId::new("2");
        d.is_duplicate(&a, "Hola", t0);
        d.is_duplicate(&b, "Hola", t0);

        assert!(d.forget(&a));
        assert!(!d.forget(&a));
        assert!(!d.is_duplicate(&a, "Hola", t0 + Duration::seconds(5)));
        assert!(d.is_duplicate(&b, "Hola", t0 + Duration::seconds(5)));
    }

    #[test]
    fn test_purge_drops_stale_baselines() {
        let d = dedup();
        let t0 = Utc::now();
        d.is_duplicate(&CustomerId::new("1"), "a", t0);
        d.is_duplicate(&CustomerId::new("2"), "b", t0 + Duration::seconds(60));
        assert_eq!(d.purge(t0 + Duration::seconds(100)), 1);
        assert_eq!(d.len(), 1);
    }
}
