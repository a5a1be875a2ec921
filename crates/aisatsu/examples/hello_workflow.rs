//! Greets three people: one waiting for a signal, one with an invalid
//! language, one through a flaky translation service.

use aisatsu::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let retry_policy = RetryPolicy::new(
        Duration::from_millis(200),
        Duration::from_secs(2),
        2.0,
        10,
    )?;
    let registry = WorkflowRegistry::builder()
        .options(
            WorkerOptions::default()
                .with_activity_options(ActivityOptions::default().with_retry_policy(retry_policy)),
        )
        .activity(HelloTranslationActivity::new().with_failure_rate(0.3))
        .build()?;

    // Ada has no language yet and waits for a signal
    let ada = registry.start(HelloRequest::new("Ada", None)).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("{} is {}", ada, registry.status(&ada).await);

    registry.signal_language(&ada, LanguageCode::Fr).await?;
    print_result(&registry, &ada).await?;

    let bob = registry
        .start(HelloRequest::new("Bob", Some(LanguageCode::Wtf)))
        .await?;
    print_result(&registry, &bob).await?;

    let carol = registry
        .start(HelloRequest::new("Carol", Some(LanguageCode::Es)))
        .await?;
    print_result(&registry, &carol).await?;

    for phase in [Phase::Completed, Phase::Error] {
        let ids = registry.executions_in_phase(phase).await;
        println!("{}: {} execution(s)", phase, ids.len());
    }

    registry.shutdown().await;
    Ok(())
}

async fn print_result(registry: &WorkflowRegistry, id: &WorkflowId) -> Result<(), WorkflowError> {
    match registry.handle(id).await?.result().await {
        Ok(response) => println!("{} -> {}", id, response.message),
        Err(e) => eprintln!("{} -> {}", id, e),
    }
    println!("{} is {}", id, registry.query_status(id).await?);
    Ok(())
}
