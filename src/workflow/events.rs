//! 工作流事件 - 流程编排层
//!
//! 工作流在关键节点发布事件，供批处理层或外部观察者订阅。
//! 发布是尽力而为的：没有订阅者或通道已关闭都不影响流程本身。

use crate::models::{GenStatus, Stage};
use tokio::sync::mpsc::UnboundedSender;

/// 工作流事件
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    StageStarted {
        project_id: String,
        stage: Stage,
    },
    StageCompleted {
        project_id: String,
        stage: Stage,
    },
    StageFailed {
        project_id: String,
        stage: Stage,
        error: String,
    },
    /// 单条视频生成落定（成功 / 部分 / 失败）
    VideoSettled {
        project_id: String,
        scene_id: String,
        status: GenStatus,
    },
    WorkflowCompleted {
        project_id: String,
    },
}

/// 事件发布器
#[derive(Clone, Default)]
pub struct EventPublisher {
    sender: Option<UnboundedSender<WorkflowEvent>>,
}

impl EventPublisher {
    pub fn new(sender: UnboundedSender<WorkflowEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// 无订阅者的空发布器
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, event: WorkflowEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let publisher = EventPublisher::new(tx);

        publisher.emit(WorkflowEvent::StageStarted {
            project_id: "p1".into(),
            stage: Stage::Analyze,
        });
        publisher.emit(WorkflowEvent::StageCompleted {
            project_id: "p1".into(),
            stage: Stage::Analyze,
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            WorkflowEvent::StageStarted {
                project_id: "p1".into(),
                stage: Stage::Analyze
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            WorkflowEvent::StageCompleted {
                project_id: "p1".into(),
                stage: Stage::Analyze
            }
        );
    }

    #[test]
    fn test_disabled_publisher_is_noop() {
        let publisher = EventPublisher::disabled();
        publisher.emit(WorkflowEvent::WorkflowCompleted {
            project_id: "p1".into(),
        });
    }
}
