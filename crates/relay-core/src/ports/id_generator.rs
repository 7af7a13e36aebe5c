//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock の時刻から monotonic な ULID を生成
//!
//! 同じミリ秒内で生成された ID もランダム部分がインクリメントされるので、
//! 生成順 = ソート順が保証されます（pending の順序と復元順が一致する）。

use std::sync::Mutex;
use std::time::SystemTime;

use ulid::{Generator, Ulid};

use crate::domain::ids::{SubscriberId, TaskId};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;

    fn generate_subscriber_id(&self) -> SubscriberId;
}

pub struct UlidGenerator<C> {
    clock: C,
    generator: Mutex<Generator>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            generator: Mutex::new(Generator::new()),
        }
    }

    fn next(&self) -> Ulid {
        let now: SystemTime = self.clock.now().into();
        // poisoned lock: 中身は単なるカウンタなので、そのまま使い続ける
        let mut generator = self
            .generator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match generator.generate_from_datetime(now) {
            Ok(ulid) => ulid,
            // random 部分が溢れた場合（同一ミリ秒に 2^80 個）: 単調性は諦める
            Err(_) => {
                let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
                Ulid::from_parts(timestamp_ms, rand::random())
            }
        }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next())
    }

    fn generate_subscriber_id(&self) -> SubscriberId {
        SubscriberId::from(self.next())
    }
}
