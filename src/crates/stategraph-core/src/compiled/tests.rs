//! Tests for CompiledGraph
//!
//! Unit-level checks of the run API. Whole-workflow scenarios live in the
//! crate's `tests/` directory.

#[cfg(test)]
mod tests {
    use crate::error::GraphError;
    use crate::state::StateError;
    use crate::{
        AppendReducer, CompiledGraph, EngineConfig, ExecutionEvent, InterruptConfig, NodeError,
        OverwriteReducer, PendingInterrupt, ResumeValue, RunConfig, State, StateGraph,
        StateSchema, END, START,
    };
    use futures::StreamExt;
    use serde_json::{json, Value};
    use stategraph_checkpoint::{CheckpointSource, CheckpointStatus};
    use std::time::Duration;

    fn schema() -> StateSchema {
        StateSchema::new()
            .with_field_default("count", OverwriteReducer, json!(0))
            .with_field("log", AppendReducer)
    }

    /// START -> first -> second -> END, each appending its name
    fn linear() -> StateGraph {
        let mut graph = StateGraph::new(schema());
        graph
            .add_node("first", |state: State| async move {
                let count = state["count"].as_i64().unwrap_or(0);
                Ok(json!({"count": count + 1, "log": ["first"]}))
            })
            .add_node("second", |state: State| async move {
                let count = state["count"].as_i64().unwrap_or(0);
                Ok(json!({"count": count + 1, "log": ["second"]}))
            })
            .add_edge(START, "first")
            .add_edge("first", "second")
            .add_edge("second", END);
        graph
    }

    fn compiled(interrupts: InterruptConfig) -> CompiledGraph {
        linear().compile_with_interrupts(interrupts).unwrap()
    }

    #[tokio::test]
    async fn test_invoke_linear() {
        let graph = compiled(InterruptConfig::default());
        let outcome = graph.invoke(json!({}), "t1").await.unwrap();

        assert!(outcome.is_completed());
        assert_eq!(outcome.state["count"], json!(2));
        assert_eq!(outcome.state["log"], json!(["first", "second"]));
        // input, START, first, second
        assert_eq!(outcome.step, 3);
    }

    #[tokio::test]
    async fn test_invoke_rejects_undeclared_input() {
        let graph = compiled(InterruptConfig::default());

        let err = graph.invoke(json!({"bogus": 1}), "t1").await.unwrap_err();
        assert!(matches!(err, GraphError::State(StateError::UnknownField(ref f)) if f == "bogus"));
        assert!(graph.get_state("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invoke_rejects_empty_thread_id() {
        let graph = compiled(InterruptConfig::default());
        let err = graph.invoke(json!({}), "").await.unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_get_state_and_history() {
        let graph = compiled(InterruptConfig::default());
        assert!(graph.get_state("t1").await.unwrap().is_none());

        graph.invoke(json!({}), "t1").await.unwrap();

        let snapshot = graph.get_state("t1").await.unwrap().unwrap();
        assert_eq!(snapshot.step, 3);
        assert_eq!(snapshot.status, CheckpointStatus::Completed);
        assert_eq!(snapshot.next, vec![END]);
        assert_eq!(snapshot.metadata.writes, vec!["second"]);

        let history = graph.get_state_history("t1", None).await.unwrap();
        let steps: Vec<u64> = history.iter().map(|s| s.step).collect();
        assert_eq!(steps, vec![3, 2, 1, 0]);
        assert_eq!(history[3].next, vec![START]);
        assert_eq!(history[3].metadata.source, Some(CheckpointSource::Input));

        let limited = graph.get_state_history("t1", Some(2)).await.unwrap();
        assert_eq!(limited.len(), 2);

        let at = graph.get_state_at("t1", 2).await.unwrap().unwrap();
        assert_eq!(at.values["log"], json!(["first"]));
    }

    #[tokio::test]
    async fn test_invoke_again_continues_step_numbering() {
        let graph = compiled(InterruptConfig::default());
        graph.invoke(json!({}), "t1").await.unwrap();

        let second = graph.invoke(json!({"count": 10}), "t1").await.unwrap();
        assert_eq!(second.step, 7);
        assert_eq!(second.state["count"], json!(12));

        let history = graph.get_state_history("t1", None).await.unwrap();
        assert_eq!(history.len(), 8);
    }

    #[tokio::test]
    async fn test_resume_unknown_thread() {
        let graph = compiled(InterruptConfig::default());
        let err = graph.resume("missing", None).await.unwrap_err();
        assert!(matches!(err, GraphError::ThreadNotFound(ref t) if t == "missing"));
    }

    #[tokio::test]
    async fn test_resume_completed_thread_is_noop() {
        let graph = compiled(InterruptConfig::default());
        let done = graph.invoke(json!({}), "t1").await.unwrap();

        let again = graph.resume("t1", None).await.unwrap();
        assert_eq!(again, done);
        assert_eq!(graph.get_state_history("t1", None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_interrupt_before_and_resume() {
        let graph = compiled(InterruptConfig::new().with_interrupt_before(vec!["second".to_string()]));

        let paused = graph.invoke(json!({}), "t1").await.unwrap();
        assert!(paused.is_interrupted());
        assert_eq!(paused.pending_interrupts, vec![PendingInterrupt::before("second")]);
        assert_eq!(paused.state["log"], json!(["first"]));

        // Without a value nothing moves
        let still = graph.resume("t1", None).await.unwrap();
        assert_eq!(still, paused);

        let done = graph
            .resume("t1", Some(ResumeValue::from(json!({"log": ["approved"]}))))
            .await
            .unwrap();
        assert!(done.is_completed());
        assert_eq!(done.state["log"], json!(["first", "approved"]));
        assert_eq!(done.state["count"], json!(1));
    }

    #[tokio::test]
    async fn test_interrupt_after_and_resume() {
        let graph = compiled(InterruptConfig::new().with_interrupt_after(vec!["first".to_string()]));

        let paused = graph.invoke(json!({}), "t1").await.unwrap();
        assert!(paused.is_interrupted());
        assert_eq!(paused.pending_interrupts, vec![PendingInterrupt::after("first")]);

        let done = graph
            .resume("t1", Some(ResumeValue::from(json!({"count": 100}))))
            .await
            .unwrap();
        assert!(done.is_completed());
        assert_eq!(done.state["count"], json!(101));
        assert_eq!(done.state["log"], json!(["first", "second"]));
    }

    #[tokio::test]
    async fn test_interrupt_after_last_node() {
        let graph = compiled(InterruptConfig::new().with_interrupt_after(vec!["second".to_string()]));

        let paused = graph.invoke(json!({}), "t1").await.unwrap();
        assert!(paused.is_interrupted());

        let done = graph.resume("t1", Some(json!({"log": ["reviewed"]}).into())).await.unwrap();
        assert!(done.is_completed());
        assert_eq!(done.state["log"], json!(["first", "second", "reviewed"]));

        let latest = graph.get_state("t1").await.unwrap().unwrap();
        assert_eq!(latest.metadata.writes, vec!["second"]);
    }

    #[tokio::test]
    async fn test_resume_value_with_undeclared_field_fails() {
        let graph = compiled(InterruptConfig::new().with_interrupt_after(vec!["first".to_string()]));
        graph.invoke(json!({}), "t1").await.unwrap();

        let err = graph
            .resume("t1", Some(json!({"nope": true}).into()))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), GraphError::MergeSchema { field, .. } if field == "nope"));

        // The suspended checkpoint is still the latest
        let latest = graph.get_state("t1").await.unwrap().unwrap();
        assert_eq!(latest.status, CheckpointStatus::AwaitingInterrupt);
    }

    #[tokio::test]
    async fn test_update_state() {
        let graph = compiled(InterruptConfig::new().with_interrupt_before(vec!["second".to_string()]));
        graph.invoke(json!({}), "t1").await.unwrap();

        let snapshot = graph
            .update_state("t1", json!({"count": 50, "log": ["edited"]}))
            .await
            .unwrap();
        assert_eq!(snapshot.values["count"], json!(50));
        assert_eq!(snapshot.values["log"], json!(["first", "edited"]));
        assert_eq!(snapshot.status, CheckpointStatus::AwaitingInterrupt);
        assert_eq!(snapshot.metadata.source, Some(CheckpointSource::Update));

        let done = graph.resume("t1", Some(json!(null).into())).await.unwrap();
        assert_eq!(done.state["count"], json!(50));

        let err = graph.update_state("t1", json!({"bogus": 1})).await.unwrap_err();
        assert!(matches!(err, GraphError::State(StateError::UnknownField(_))));

        let err = graph.update_state("nobody", json!({})).await.unwrap_err();
        assert!(matches!(err, GraphError::ThreadNotFound(_)));
    }

    #[tokio::test]
    async fn test_non_object_output_fails_run() {
        let mut graph = StateGraph::new(schema());
        graph
            .add_node("bad", |_state: State| async move { Ok(json!([1, 2, 3])) })
            .add_edge(START, "bad")
            .add_edge("bad", END);
        let graph = graph.compile().unwrap();

        let err = graph.invoke(json!({}), "t1").await.unwrap_err();
        assert!(matches!(err.kind(), GraphError::State(StateError::InvalidUpdate(_))));
        assert_eq!(err.run_context(), Some(("t1", 2)));
    }

    #[tokio::test]
    async fn test_sequential_matches_parallel() {
        let parallel = compiled(InterruptConfig::default());
        let sequential = compiled(InterruptConfig::default())
            .with_config(EngineConfig::new().with_parallel_nodes(false));

        let a = parallel.invoke(json!({}), "t1").await.unwrap();
        let b = sequential.invoke(json!({}), "t1").await.unwrap();
        assert_eq!(a.state, b.state);
        assert_eq!(a.step, b.step);
    }

    #[tokio::test]
    async fn test_invalid_engine_config_rejected() {
        let graph = compiled(InterruptConfig::default())
            .with_config(EngineConfig::new().with_node_timeout(Duration::ZERO));
        let err = graph.invoke(json!({}), "t1").await.unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_stream_events() {
        let graph = compiled(InterruptConfig::default());
        let events: Vec<ExecutionEvent> = graph
            .stream(json!({}), RunConfig::new("t1"))
            .await
            .unwrap()
            .collect()
            .await;

        let starts: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::NodeStart { node, .. } => Some(node.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec!["first", "second"]);

        let commits = events
            .iter()
            .filter(|e| matches!(e, ExecutionEvent::StepCommitted { .. }))
            .count();
        assert_eq!(commits, 4);

        match events.last() {
            Some(ExecutionEvent::Complete { final_state }) => {
                assert_eq!(final_state["count"], json!(2));
            }
            other => panic!("unexpected last event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_reports_node_failure() {
        let mut graph = StateGraph::new(schema());
        graph
            .add_node("boom", |_state: State| async move {
                Err::<Value, NodeError>("exploded".into())
            })
            .add_edge(START, "boom")
            .add_edge("boom", END);
        let graph = graph.compile().unwrap();

        let events: Vec<ExecutionEvent> = graph
            .stream(json!({}), RunConfig::new("t1"))
            .await
            .unwrap()
            .collect()
            .await;

        match events.last() {
            Some(ExecutionEvent::Error { error }) => assert!(error.contains("exploded")),
            other => panic!("unexpected last event: {:?}", other),
        }
    }

    #[test]
    fn test_introspection() {
        let mut graph = StateGraph::new(schema());
        graph
            .add_node("analyze", |_state: State| async move { Ok(json!({})) })
            .add_node("report", |_state: State| async move { Ok(json!({})) })
            .add_edge(START, "analyze")
            .add_conditional_edges(
                "analyze",
                |_state: &State| "done",
                [("again", "analyze"), ("done", "report")],
            )
            .mark_terminal("report");
        let graph = graph.compile().unwrap();

        assert_eq!(graph.node_names(), vec!["analyze", "report"]);
        assert_eq!(graph.edges_from(START).len(), 1);
        assert!(graph.edges_from("report").is_empty());

        let expected = "\
graph TD
    __start__([__start__])
    analyze[analyze]
    report[[report]]
    __end__([__end__])
    __start__ --> analyze
    analyze -.->|again| analyze
    analyze -.->|done| report
";
        assert_eq!(graph.to_mermaid(), expected);
    }
}
