//! CLI command handling
//!
//! Builds the run environment from configuration and flags, drives the
//! suite and formats output.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::harness::js::load_script;
use crate::harness::{
    add_js_tests, discover, Expectation, HarnessResult, JsonLogger, RunEnv, SessionRegistry,
    StructuredLogger, SuiteOptions, TestSuite, TracingLogger,
};
use crate::marionette::MarionetteClient;

/// Dispatch a CLI command
///
/// Returns whether the run was successful.
pub async fn dispatch(command: Commands) -> Result<bool> {
    match command {
        Commands::Run {
            paths,
            address,
            binary,
            timeout,
            expected,
            log_json,
            config,
            test_container,
        } => {
            let mut config = match config {
                Some(path) => Config::load_from(&path)?,
                None => Config::load()?,
            };
            apply_overrides(
                &mut config,
                Overrides {
                    address,
                    binary,
                    timeout,
                    expected,
                    test_container,
                },
            )?;
            run_tests(&paths, &config, log_json).await
        }

        Commands::List { paths } => {
            list_tests(&paths)?;
            Ok(true)
        }
    }
}

/// Command-line values that take precedence over the config file
struct Overrides {
    address: Option<String>,
    binary: Option<PathBuf>,
    timeout: Option<u64>,
    expected: Option<Expectation>,
    test_container: bool,
}

fn apply_overrides(config: &mut Config, overrides: Overrides) -> Result<()> {
    if let Some(address) = overrides.address {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| Error::Config(format!("Address must be host:port, got '{}'", address)))?;
        config.connection.host = host.to_string();
        config.connection.port = port
            .parse()
            .map_err(|_| Error::Config(format!("Invalid port in address '{}'", address)))?;
    }
    if overrides.binary.is_some() {
        config.connection.binary = overrides.binary;
    }
    if overrides.timeout.is_some() {
        config.timeouts.default_ms = overrides.timeout;
    }
    if let Some(expected) = overrides.expected {
        config.run.expected = expected;
    }
    if overrides.test_container {
        config.run.test_container = true;
    }
    Ok(())
}

async fn run_tests(paths: &[PathBuf], config: &Config, log_json: Option<PathBuf>) -> Result<bool> {
    let tests = discover(paths)?;
    if tests.is_empty() {
        println!("No tests found");
        return Ok(true);
    }

    let logger: Arc<dyn StructuredLogger> = match log_json {
        Some(path) => {
            let file = File::create(&path).map_err(|e| Error::file_read(&path, &e))?;
            Arc::new(JsonLogger::new(BufWriter::new(file)))
        }
        None => Arc::new(TracingLogger),
    };
    let env = RunEnv::from_config(config, Arc::clone(&logger))?;

    let flag = env.interrupt_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, stopping after the current test".yellow());
            flag.store(true, Ordering::SeqCst);
        }
    });

    let address = config.connection.address();
    let startup = Duration::from_secs(config.connection.startup_timeout_secs);
    let mut client = match &config.connection.binary {
        Some(binary) => {
            MarionetteClient::launch(binary, &config.connection.binary_args, &address, startup).await?
        }
        None => MarionetteClient::connect(&address, startup).await?,
    };
    if let Some(base_url) = &config.connection.base_url {
        client.set_base_url(base_url.clone());
    }

    let mut sessions = SessionRegistry::new();
    let handle = sessions.insert(Box::new(client));

    let mut suite = TestSuite::new();
    add_js_tests(
        &tests,
        &mut suite,
        handle,
        SuiteOptions {
            expected: config.run.expected,
            test_container: config.run.test_container,
        },
    );

    println!(
        "\n{} {} tests against {}",
        "Running".blue().bold(),
        suite.len(),
        address.white().bold()
    );

    let mut result = HarnessResult::new(logger);
    let outcome = suite.run(&mut sessions, &env, &mut result).await;

    if let Some(mut session) = sessions.remove(handle) {
        if let Err(e) = session.close().await {
            tracing::debug!("Failed to close connection: {}", e);
        }
    }

    print_summary(&result);
    outcome?;
    Ok(result.was_successful())
}

fn print_summary(result: &HarnessResult) {
    let failed = result.failures();
    let errors = result.errors();

    if !failed.is_empty() || !errors.is_empty() {
        println!("\n{}", "Problems:".red().bold());
        for test in failed.iter().chain(errors.iter()) {
            println!(
                "  {} {}",
                test.id.white().bold(),
                test.outcome.message().unwrap_or_default().dimmed()
            );
        }
    }

    let line = format!("{} ({} run)", result.summary(), result.tests_run());
    if result.was_successful() {
        println!("\n{} {}", "✓".green().bold(), line.green());
    } else {
        println!("\n{} {}", "✗".red().bold(), line.red());
    }
}

fn list_tests(paths: &[PathBuf]) -> Result<()> {
    let tests = discover(paths)?;
    if tests.is_empty() {
        println!("No tests found");
        return Ok(());
    }

    for path in &tests {
        println!("{}", path.display().to_string().white().bold());
        match load_script(path) {
            Ok(script) => {
                let d = &script.directives;
                if let Some(head) = &d.head_js {
                    println!("  head:               {}", head);
                }
                println!("  context:            {}", d.context.as_deref().unwrap_or("content"));
                if let Some(timeout) = d.timeout {
                    println!("  timeout:            {} ms", timeout);
                }
                if let Some(timeout) = d.inactivity_timeout {
                    println!("  inactivity timeout: {} ms", timeout);
                }
            }
            Err(e) => println!("  {} {}", "✗".red(), e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides() -> Overrides {
        Overrides {
            address: None,
            binary: None,
            timeout: None,
            expected: None,
            test_container: false,
        }
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config = Config::default();
        apply_overrides(
            &mut config,
            Overrides {
                address: Some("example.test:2929".to_string()),
                timeout: Some(1000),
                expected: Some(Expectation::Fail),
                test_container: true,
                ..overrides()
            },
        )
        .unwrap();

        assert_eq!(config.connection.address(), "example.test:2929");
        assert_eq!(config.timeouts.default_ms, Some(1000));
        assert_eq!(config.run.expected, Expectation::Fail);
        assert!(config.run.test_container);
    }

    #[test]
    fn test_bad_address_is_config_error() {
        let mut config = Config::default();
        let err = apply_overrides(
            &mut config,
            Overrides {
                address: Some("no-port".to_string()),
                ..overrides()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_absent_overrides_keep_config() {
        let mut config = Config::default();
        apply_overrides(&mut config, overrides()).unwrap();
        assert_eq!(config.connection.address(), "localhost:2828");
        assert_eq!(config.timeouts.default_ms, None);
    }
}
