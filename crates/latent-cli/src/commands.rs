use colored::Colorize;

use crate::cli::*;
use crate::demo::{self, ScenarioReport};
use crate::project::{self, EntityPlan, ProjectDocument};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Plan(args) => cmd_plan(args, cli.format),
        Command::Demo(args) => cmd_demo(args, cli.format),
    }
}

fn cmd_plan(args: PlanArgs, format: OutputFormat) -> anyhow::Result<()> {
    let document = ProjectDocument::load(&args.mapping)?;
    let model = document.metamodel()?;
    let plans = project::plan(&model, args.entity.as_deref())?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plans)?),
        OutputFormat::Text => {
            let outside = if document.factory.allow_load_outside_transaction {
                "allowed".green()
            } else {
                "refused".yellow()
            };
            println!("Loading outside a transaction: {outside}");
            for plan in &plans {
                print_plan(plan);
            }
        }
    }
    Ok(())
}

fn print_plan(plan: &EntityPlan) {
    let mode = if plan.enhanced { "enhanced" } else { "plain" };
    println!("\n{} ({})", plan.name.bold(), mode.dimmed());
    println!("  Identifier: {}", plan.identifier.join(", ").cyan());
    if !plan.collections.is_empty() {
        println!("  Collections: {}", plan.collections.join(", "));
    }
    let writes = if plan.full_init_before_write {
        "load full state first".yellow()
    } else {
        "recorded without loading".green()
    };
    println!("  Writes: {writes}");
    if plan.fetch_groups.is_empty() {
        println!("  No lazy attributes.");
        return;
    }
    for group in &plan.fetch_groups {
        println!("  {} {}", group.name.yellow(), group.attributes.join(", "));
    }
}

fn cmd_demo(args: DemoArgs, format: OutputFormat) -> anyhow::Result<()> {
    let reports = demo::run(args.allow_load_outside_transaction)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => reports.iter().for_each(print_report),
    }
    Ok(())
}

fn print_report(report: &ScenarioReport) {
    println!("{} {}", "▸".cyan(), report.name.bold());
    for step in &report.steps {
        println!("  {step}");
    }
    println!(
        "  {} full, {} group loads; sessions {} opened, {} closed\n",
        report.full_loads.to_string().bold(),
        report.group_loads.to_string().bold(),
        report.sessions_opened,
        report.sessions_closed,
    );
}
