//! Human approval example
//!
//! Suspends before `review`, persists to SQLite, then resumes the thread with a
//! freshly compiled graph as a restarted process would.

use serde_json::{json, Value};
use stategraph_core::{
    CompiledGraph, OverwriteReducer, ResumeValue, SqliteCheckpointSaver, State, StateGraph,
    StateSchema, END, START,
};
use std::sync::Arc;

fn build(saver: Arc<SqliteCheckpointSaver>) -> Result<CompiledGraph, Box<dyn std::error::Error>> {
    let schema = StateSchema::new()
        .with_field("draft", OverwriteReducer)
        .with_field_default("approved", OverwriteReducer, json!(false))
        .with_field("published", OverwriteReducer);

    let mut graph = StateGraph::new(schema);
    graph
        .add_node("write", |_state: State| async move {
            Ok(json!({"draft": "Quarterly report"}))
        })
        .add_node("review", |_state: State| async move { Ok(Value::Null) })
        .add_node("publish", |state: State| async move {
            let approved = state.get("approved") == Some(&json!(true));
            Ok(json!({"published": approved}))
        })
        .add_edge(START, "write")
        .add_edge("write", "review")
        .add_edge("review", "publish")
        .add_edge("publish", END)
        .interrupt_before("review");

    Ok(graph.compile()?.with_checkpointer(saver))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Approval Workflow Example ===\n");

    let dir = std::env::temp_dir().join("stategraph-approval-demo");
    let path = dir.join("checkpoints.db");
    let _ = std::fs::remove_file(&path);

    let first = build(Arc::new(SqliteCheckpointSaver::open(&path)?))?;
    let paused = first.invoke(json!({}), "report-7").await?;
    println!("Suspended at step {}: {:?}", paused.step, paused.pending_interrupts);
    drop(first);

    // Later, in another process
    let second = build(Arc::new(SqliteCheckpointSaver::open(&path)?))?;
    let waiting = second.get_state("report-7").await?;
    if let Some(snapshot) = waiting {
        println!("Reloaded step {} with next={:?}", snapshot.step, snapshot.next);
    }

    let done = second
        .resume("report-7", Some(ResumeValue::from(json!({"approved": true}))))
        .await?;
    println!("\nFinal state: {}", Value::Object(done.state));

    Ok(())
}
