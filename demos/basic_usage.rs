//! Basic usage example for api-automate

use api_automate::automation::create_shared_sequencer;
use api_automate::collection::CollectionDocument;
use api_automate::config::{AppConfig, AutomationConfig, SharedConfig};
use api_automate::executor::HttpExecutor;
use api_automate::templates::OverrideField;
use api_automate::transcript::create_shared_transcript;
use api_automate::workspace::create_shared_workspace;

const COLLECTION: &str = r#"{
    "info": {"name": "httpbin"},
    "variable": [{"key": "baseUrl", "value": "https://httpbin.org"}],
    "item": [
        {"name": "Inspect", "item": [
            {"name": "Get", "request": {"method": "GET", "url": "{{baseUrl}}/get?page=1"}},
            {"name": "Post", "request": {
                "method": "POST",
                "url": "{{baseUrl}}/post",
                "body": {"mode": "raw", "raw": "{\"hello\": \"world\"}"}
            }}
        ]}
    ]
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Create configuration
    let mut config = AppConfig::default();
    config.automation = AutomationConfig {
        start_delay_ms: 0,
        step_delay_ms: 250,
        error_delay_ms: 250,
    };
    println!("HTTP timeout: {}ms", config.http.timeout_ms);

    // Create shared state
    let shared_config = SharedConfig::new(config.clone());
    let transcript = create_shared_transcript(config.transcript.max_entries);
    let workspace = create_shared_workspace(&config, transcript.clone());
    let executor = HttpExecutor::new(&config.http)?;
    let sequencer = create_shared_sequencer(workspace.clone(), executor, shared_config);

    // Import and queue everything
    let report = workspace
        .write()
        .import_document(CollectionDocument::from_json(COLLECTION)?, None);
    println!("Imported {} methods", report.imported);

    {
        let mut ws = workspace.write();
        let key = ws.key("Inspect - Post")?;
        ws.save_override(OverrideField::Body, &key, r#"{"hello": "override"}"#)?;
        ws.enqueue_all()?;
    }

    // Run the queue
    println!("\nRunning automation...");
    let summary = sequencer.run().await?;

    println!("\nAutomation Results:");
    println!("  Total steps: {}", summary.total);
    println!("  Successful: {}", summary.successful);
    println!("  Failed: {}", summary.failed);
    println!("  Duration: {:.2}ms", summary.total_duration_ms);

    println!("\nTranscript:");
    println!("{}", transcript.render());

    Ok(())
}
