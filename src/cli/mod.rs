// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train` — trains a ViT on CIFAR-10, optionally resuming
//   2. `eval`  — loads a checkpoint and reports test accuracy
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvalArgs, TrainArgs};

use crate::application::eval_use_case::EvalReport;
use crate::application::train_use_case::TrainConfig;
use crate::domain::image::class_name;

#[derive(Parser, Debug)]
#[command(
    name = "vit-cifar",
    version = "0.1.0",
    about = "Train a Vision Transformer on CIFAR-10 and compare standard \
             attention against replayed fixed attention weights."
)]
pub struct Cli {
    /// The subcommand to run (train or eval)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Eval(args)  => run_eval(args),
        }
    }
}

/// Handles the `train` subcommand.
fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config = if let Some(path) = args.config.clone() {
        tracing::info!("Reading training config from '{}'", path);
        let cfg = TrainConfig::from_file(&path)?;
        TrainConfig { resume: cfg.resume || args.resume, save: cfg.save || args.save, ..cfg }
    } else {
        args.into()
    };

    let summary = TrainUseCase::new(config).execute()?;

    println!(
        "Ran {} epoch(s) starting at epoch {}",
        summary.epochs_run, summary.start_epoch + 1
    );
    if let Some(last) = &summary.last {
        println!(
            "Finished epoch {}: standard {:.4}, fixed {:.4} (best standard {:.4})",
            last.epoch, last.test_acc_standard, last.test_acc_fixed, summary.best_test_acc
        );
    }
    println!("Total time: {:.1}s", summary.elapsed.as_secs_f64());
    Ok(())
}

/// Handles the `eval` subcommand.
fn run_eval(args: EvalArgs) -> Result<()> {
    use crate::application::eval_use_case::EvalUseCase;

    let report = EvalUseCase::new(args.into()).execute()?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &EvalReport) {
    println!("\nEvaluated {} test images", report.num_images);
    for acc in &report.results {
        println!(
            "\n[{}] accuracy: {:.4} ({}/{})",
            acc.mode, acc.ratio(), acc.correct, acc.total
        );
        for class in 0..acc.class_total.len() {
            println!("  {:<6} {:.4}", class_name(class), acc.class_ratio(class));
        }
    }
}
