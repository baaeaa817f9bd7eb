// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared harness: in-memory store, in-process bus, router and an HTTP
//! server bound to an ephemeral port.

#![allow(dead_code)]

use sensor_storage::{
    api, AppContext, ChannelBus, Config, Feed, PartitionNames, RouterHandle, SqliteStore,
    SubscriptionRouter,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const RAW_SUBJECT: &str = "sensors.raw.S1";
pub const AVG_SUBJECT: &str = "sensors.avg.S1";
pub const SECURITY_SUBJECT: &str = "sensors.security.S1";

pub struct Harness {
    pub bus: Arc<ChannelBus>,
    pub ctx: AppContext,
    pub router: Arc<SubscriptionRouter>,
    pub base_url: String,
    handle: RouterHandle,
    router_task: JoinHandle<()>,
    http_task: JoinHandle<()>,
}

impl Harness {
    pub async fn start() -> Self {
        let store = SqliteStore::new_in_memory(PartitionNames::default()).unwrap();
        Self::with_context(AppContext::new(store)).await
    }

    pub async fn with_context(ctx: AppContext) -> Self {
        let bus = Arc::new(ChannelBus::new());
        let router = Arc::new(SubscriptionRouter::new(&ctx, Config::default().routes()));
        let handle = router.handle();

        let router_task = {
            let router = Arc::clone(&router);
            let bus = Arc::clone(&bus);
            tokio::spawn(async move {
                router.run(bus.as_ref()).await.unwrap();
            })
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let http_task = {
            let ctx = ctx.clone();
            let stop = handle.clone();
            tokio::spawn(async move {
                api::serve(listener, ctx, async move { stop.stopped().await })
                    .await
                    .unwrap();
            })
        };

        let harness = Self {
            bus,
            ctx,
            router,
            base_url,
            handle,
            router_task,
            http_task,
        };
        wait_until(|| harness.bus.subscription_count() == Feed::ALL.len()).await;
        harness
    }

    /// Publish and wait until the router has finished handling the message.
    pub async fn publish(&self, subject: &str, payload: &Value) {
        let feed = feed_for(subject);
        let before = self.handled(feed);
        assert_eq!(self.bus.publish_json(subject, payload).await, 1);
        wait_until(|| self.handled(feed) > before).await;
    }

    pub fn handled(&self, feed: Feed) -> u64 {
        let stats = self.router.stats(feed).unwrap();
        stats.stored + stats.failed
    }

    pub async fn get(&self, path: &str) -> (u16, Value) {
        let response = reqwest::get(format!("{}{}", self.base_url, path))
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    pub async fn shutdown(self) {
        self.handle.stop();
        self.router_task.await.unwrap();
        self.http_task.await.unwrap();
    }
}

fn feed_for(subject: &str) -> Feed {
    Feed::ALL
        .into_iter()
        .find(|feed| subject.starts_with(&format!("sensors.{}.", feed.as_str())))
        .unwrap()
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
