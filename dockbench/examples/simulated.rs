use std::io;
use std::sync::Arc;
use std::time::Duration;

use dockbench::{
    Benchmark, ErrorPolicy, Operation, OperationError, Reporter, Scenario, SimulatedRuntime,
    TableReporter, Termination, Thresholds,
    runtime::{ContainerRuntime, create_alive_containers, remove_all_containers},
};

/// Inspect every container we are handed, then list them all.
struct InspectThenList {
    runtime: Arc<SimulatedRuntime>,
}

impl Operation for InspectThenList {
    async fn invoke(&self, target: Option<&str>) -> Result<(), OperationError> {
        let id = target.ok_or(OperationError::MissingTarget)?;
        self.runtime.inspect_container(id).await?;
        self.runtime.list_containers(true).await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    // One runtime for every worker, never one per call
    let runtime = Arc::new(SimulatedRuntime::new(Duration::from_millis(2)));
    let ids = create_alive_containers(runtime.as_ref(), 200).await.unwrap();

    let outcome = Scenario::builder()
        .name("inspect then list")
        .operation(InspectThenList {
            runtime: runtime.clone(),
        })
        .benchmark(
            Benchmark::builder()
                .workers(8)
                .rate(500.0)
                // Every id exactly once, spread over the workers
                .termination(Termination::Targets(ids))
                .on_operation_error(ErrorPolicy::RecordAsFailure)
                .build(),
        )
        .labels(vec!["8".to_string()])
        .build()
        .run()
        .await
        .unwrap();

    let thresholds = Thresholds::default();
    let mut reporter = TableReporter::new(io::stdout(), thresholds.clone());
    reporter.title("Benchmark: inspect then list").unwrap();
    reporter.labels(&["#workers"]).unwrap();
    outcome.report(&mut reporter, &thresholds).unwrap();

    remove_all_containers(runtime.as_ref(), Duration::from_secs(10))
        .await
        .unwrap();
}
