use std::fmt;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// 事件主题
///
/// 每个等待者一个 queue 主题，每个会话一个 session 主题。
/// 同一主题内事件按发布顺序投递；跨主题不做任何顺序承诺。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// queue:{identity_id}
    Queue(u64),
    /// session:{session_id}
    Session(Uuid),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Queue(id) => write!(f, "queue:{}", id),
            Topic::Session(id) => write!(f, "session:{}", id),
        }
    }
}

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// 匹配提交，会话已创建（发往双方 queue 主题）
    SessionCreated,
    /// 双方确认完毕，会话转入 active
    SessionActivated,
    /// 会话结束
    SessionEnded,
    /// 新消息
    Message,
    /// 队列条目 TTL 过期被驱逐
    QueueTimeout,
    /// 在场确认（presence join）
    PresenceJoin,
    /// 离场（presence leave）
    PresenceLeave,
}

/// 事件信封 {type, payload, ts}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: serde_json::Value,
    /// 发布时间（毫秒时间戳）
    pub ts: i64,
}

impl FanoutEvent {
    pub fn new(event_type: EventType, payload: serde_json::Value, at: DateTime<Utc>) -> Self {
        Self {
            event_type,
            payload,
            ts: at.timestamp_millis(),
        }
    }
}

type TopicMap = Arc<DashMap<Topic, broadcast::Sender<FanoutEvent>>>;

/// 实时事件分发中心
///
/// 每主题一条 broadcast 通道：at-least-once、主题内按发布顺序。
/// 订阅以句柄的生命周期为界，句柄 drop 即退订，最后一个订阅者
/// 离开后主题通道被回收，不会泄漏注册。
pub struct FanoutHub {
    topics: TopicMap,
    /// 每主题通道容量（慢消费者超出后按 lagged 计数丢弃最旧事件）
    capacity: usize,
}

impl FanoutHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            capacity,
        }
    }

    /// 订阅主题，返回限定作用域的订阅句柄
    pub fn subscribe(&self, topic: Topic) -> SubscriptionHandle {
        let sender = self
            .topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone();

        SubscriptionHandle {
            topic,
            receiver: Some(sender.subscribe()),
            topics: Arc::clone(&self.topics),
        }
    }

    /// 发布事件，返回收到事件的订阅者数量
    ///
    /// 没有订阅者时事件被丢弃：投递保证只面向已订阅的客户端
    pub fn publish(&self, topic: &Topic, event: FanoutEvent) -> usize {
        match self.topics.get(topic) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// 当前主题的订阅者数量
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics
            .get(topic)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// 活跃主题数量（指标用）
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new(256)
    }
}

/// 订阅句柄
///
/// drop 即退订；最后一个订阅者退出后回收主题通道
pub struct SubscriptionHandle {
    topic: Topic,
    receiver: Option<broadcast::Receiver<FanoutEvent>>,
    topics: TopicMap,
}

impl SubscriptionHandle {
    /// 接收下一个事件；通道关闭时返回 None
    ///
    /// 慢消费者被挤掉的事件只记入 lagged 指标，接收继续
    pub async fn recv(&mut self) -> Option<FanoutEvent> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    crate::infra::metrics::record_fanout_lagged(skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// 订阅的主题
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// 非阻塞接收（测试用）
    pub fn try_recv(&mut self) -> Option<FanoutEvent> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    crate::infra::metrics::record_fanout_lagged(skipped);
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        // 先释放接收端，再回收无人订阅的主题通道
        self.receiver = None;
        self.topics
            .remove_if(&self.topic, |_, sender| sender.receiver_count() == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: EventType, n: u64) -> FanoutEvent {
        FanoutEvent::new(event_type, json!({ "n": n }), Utc::now())
    }

    #[tokio::test]
    async fn test_publish_order_per_topic() {
        let hub = FanoutHub::default();
        let topic = Topic::Queue(1);
        let mut sub = hub.subscribe(topic.clone());

        for n in 0..5 {
            hub.publish(&topic, event(EventType::Message, n));
        }

        // 同一主题按发布顺序投递
        for n in 0..5 {
            let received = sub.recv().await.unwrap();
            assert_eq!(received.payload["n"], n);
        }
    }

    #[tokio::test]
    async fn test_no_cross_topic_delivery() {
        let hub = FanoutHub::default();
        let mut sub = hub.subscribe(Topic::Queue(1));

        hub.publish(&Topic::Queue(2), event(EventType::QueueTimeout, 0));

        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_drop_unsubscribes_and_reclaims_topic() {
        let hub = FanoutHub::default();
        let topic = Topic::Session(Uuid::new_v4());

        let sub = hub.subscribe(topic.clone());
        assert_eq!(hub.subscriber_count(&topic), 1);
        assert_eq!(hub.topic_count(), 1);

        drop(sub);
        assert_eq!(hub.subscriber_count(&topic), 0);
        assert_eq!(hub.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let hub = FanoutHub::default();
        assert_eq!(hub.publish(&Topic::Queue(9), event(EventType::Message, 0)), 0);
    }

    #[tokio::test]
    async fn test_two_subscribers_both_receive() {
        let hub = FanoutHub::default();
        let topic = Topic::Session(Uuid::new_v4());
        let mut a = hub.subscribe(topic.clone());
        let mut b = hub.subscribe(topic.clone());

        let delivered = hub.publish(&topic, event(EventType::Message, 7));
        assert_eq!(delivered, 2);

        assert_eq!(a.recv().await.unwrap().payload["n"], 7);
        assert_eq!(b.recv().await.unwrap().payload["n"], 7);
    }
}
