//! Conditional routing example
//!
//! A cycle that analyzes until a counter reaches its limit, then summarizes.
//! Prints every checkpoint of the thread afterwards.

use serde_json::{json, Value};
use stategraph_core::{AppendReducer, OverwriteReducer, State, StateGraph, StateSchema, END, START};

fn iteration(state: &State) -> i64 {
    state.get("iteration").and_then(Value::as_i64).unwrap_or(0)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Conditional Routing Example ===\n");

    let schema = StateSchema::new()
        .with_field_default("iteration", OverwriteReducer, json!(0))
        .with_field("log", AppendReducer)
        .with_field("summary", OverwriteReducer);

    let mut graph = StateGraph::new(schema);
    graph
        .add_node("analyze", |state: State| async move {
            let next = iteration(&state) + 1;
            println!("analyze: pass {}", next);
            Ok(json!({"iteration": next, "log": [format!("pass {}", next)]}))
        })
        .add_node("summarize", |state: State| async move {
            Ok(json!({"summary": format!("{} passes", iteration(&state))}))
        })
        .add_edge(START, "analyze")
        .add_conditional_edges(
            "analyze",
            |state: &State| if iteration(state) < 3 { "again" } else { "done" },
            [("again", "analyze"), ("done", "summarize")],
        )
        .add_edge("summarize", END);

    let compiled = graph.compile()?;
    println!("{}", compiled.to_mermaid());

    let outcome = compiled.invoke(json!({}), "routing-demo").await?;
    println!("\nFinal state: {}", Value::Object(outcome.state.clone()));

    println!("\nHistory (newest first):");
    for snapshot in compiled.get_state_history("routing-demo", None).await? {
        println!(
            "  step {:>2} [{}] next={:?}",
            snapshot.step, snapshot.status, snapshot.next
        );
    }

    Ok(())
}
