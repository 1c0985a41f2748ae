use std::fs::File;
use std::io::BufReader;

use crate::errors::CliError;
use crate::println_pad;
use colored::Colorize;
use miette::{IntoDiagnostic, WrapErr};
use resguard_arsc::PreScan;

pub struct InfoTableArgs {
    pub file_path: String,
}

pub fn info_resource_table(args: InfoTableArgs) -> miette::Result<()> {
    let file = File::open(&args.file_path)
        .into_diagnostic()
        .with_context(|| format!("Failed to open resource table: {}", args.file_path))?;
    let scan = PreScan::scan(&mut BufReader::new(file)).map_err(CliError::from)?;

    println_pad!(
        "{} {}",
        "🗂️ Resource table:".bright_blue().bold(),
        args.file_path.bright_cyan().bold()
    );

    for package in scan.packages() {
        println_pad!(
            "\n{} {} {}",
            "📦 Package:".bright_magenta().bold(),
            package.name.bright_cyan().bold(),
            format!("(id: 0x{:02x})", package.id).dimmed()
        );
        for (type_id, res_type) in &package.types {
            println_pad!(
                "   {} {} {}",
                "•".bright_cyan(),
                res_type.name.bright_cyan().bold(),
                format!(
                    "(id: 0x{:02x}, entries: {}, names: {}, configs: {})",
                    type_id,
                    res_type.entry_ids.len(),
                    res_type.spec_names.len(),
                    res_type.config_count
                )
                .dimmed()
            );
        }
    }

    Ok(())
}
