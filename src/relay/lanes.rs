//! 按客户串行化：同一客户的事件依次处理，不同客户互不阻塞

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::session::CustomerId;

#[derive(Default)]
pub struct CustomerLanes {
    lanes: Mutex<HashMap<CustomerId, Arc<AsyncMutex<()>>>>,
}

impl CustomerLanes {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取该客户的独占通道，持有期间其他同客户事件等待
    pub async fn acquire(&self, customer: &CustomerId) -> OwnedMutexGuard<()> {
        let lane = {
            let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
            lanes.entry(customer.clone()).or_default().clone()
        };
        lane.lock_owned().await
    }

    /// 回收当前无人持有的通道，返回回收数量
    pub fn prune_idle(&self) -> usize {
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        let before = lanes.len();
        lanes.retain(|_, lane| Arc::strong_count(lane) > 1 || lane.try_lock().is_err());
        before - lanes.len()
    }

    pub fn len(&self) -> usize {
        self.lanes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
