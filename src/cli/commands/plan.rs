//! # Plan Command Module
//!
//! Classifies the test tree and prints the resulting run plan without
//! executing anything. Classification errors surface exactly as they would
//! for `run`.

use anyhow::Result;
use colored::*;

use crate::{
    cli::commands::{
        CommonArgs, classify_tree, default_registry, discovery_request, load_runner_config,
    },
    core::planner::RunPlan,
    infra::t,
};

pub fn execute(args: CommonArgs) -> Result<()> {
    let config = load_runner_config(&args)?;
    let locale = crate::resolve_locale(&config.language);
    rust_i18n::set_locale(&locale);

    let request = discovery_request(&config, args.single_test.as_deref())?;
    let plan = classify_tree(&request, &default_registry(&config))?;
    print_plan(&plan, &locale);
    Ok(())
}

/// Prints shareable groups (with their brackets) followed by exclusive tests
/// in execution order.
pub fn print_plan(plan: &RunPlan, locale: &str) {
    println!("{}", t!("plan.shareable_header", locale = locale).bold());
    if plan.shareable_groups().is_empty() {
        println!("  {}", t!("plan.none", locale = locale).dimmed());
    }
    for (configuration, members) in plan.shareable_groups() {
        println!(
            "  [{}] {}",
            configuration.token().cyan(),
            t!("plan.group_size", locale = locale, count = members.len())
        );
        let pair = plan.brackets().get(configuration);
        if let Some(pair) = pair {
            println!("    + {}", pair.setup.module_name.dimmed());
        }
        for descriptor in members {
            println!("    - {}", descriptor.module_key);
        }
        if let Some(pair) = pair {
            println!("    + {}", pair.teardown.module_name.dimmed());
        }
    }

    println!("\n{}", t!("plan.exclusive_header", locale = locale).bold());
    if plan.exclusive_tests().is_empty() {
        println!("  {}", t!("plan.none", locale = locale).dimmed());
    }
    for (i, descriptor) in plan.exclusive_tests().iter().enumerate() {
        println!(
            "  {:>3}. {} [{}]",
            i + 1,
            descriptor.module_key,
            descriptor.configuration.token().cyan()
        );
    }

    println!(
        "\n{}",
        t!(
            "plan_summary",
            locale = locale,
            exclusive = plan.exclusive_tests().len(),
            shareable = plan.shareable_count(),
            groups = plan.shareable_groups().len(),
            brackets = plan.brackets().len()
        )
    );
}
