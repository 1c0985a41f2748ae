use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use colored::Colorize;
use miette::{IntoDiagnostic, Result, WrapErr};
use resguard_arsc::{PriorMapping, Resguard, ResguardOptions, ResguardReport, RESOURCES_ARSC};
use resguard_config::ResguardConfig;

use crate::errors::CliError;
use crate::utils::config::{load_config, read_compress_data, write_json_pretty};

pub const MAPPING_FILE_NAME: &str = "resource_mapping.txt";
pub const MERGE_LOG_FILE_NAME: &str = "merge_duplicated_res_mapping.txt";
pub const COMPRESS_DATA_FILE_NAME: &str = "compress_data.json";

#[derive(Debug)]
pub struct ObfuscateArgs {
    pub input_dir: String,
    pub output_dir: String,
    pub config_path: Option<String>,
    pub mapping: Option<String>,
    pub keep_root: bool,
    pub merge_duplicates: bool,
    pub compress_data: Option<String>,
}

pub fn obfuscate_resources(args: ObfuscateArgs) -> Result<()> {
    let input_dir = Utf8PathBuf::from(&args.input_dir);
    let table_path = input_dir.join(RESOURCES_ARSC);
    if !table_path.is_file() {
        return Err(CliError::table_not_found(table_path).into());
    }

    let config = resolve_config(&args)?;
    tracing::debug!("Resolved config: {:?}", config);
    let whitelist = config
        .compile_whitelist()
        .map_err(CliError::config_parse_error)?;
    let prior = match &config.mapping {
        Some(path) => {
            let path = Utf8PathBuf::from(path);
            PriorMapping::from_path(&path).map_err(|e| CliError::mapping_parse_error(path, e))?
        }
        None => PriorMapping::new(),
    };
    let compress_data = match &args.compress_data {
        Some(path) => read_compress_data(Utf8Path::new(path))?,
        None => BTreeMap::new(),
    };

    println!(
        "{} {}",
        "🔐 Obfuscating resources:".bright_blue().bold(),
        input_dir.as_str().bright_cyan().bold()
    );
    if !prior.is_empty() {
        println!(
            "{} {}",
            "📎 Reusing mapping:".bright_green(),
            config.mapping.as_deref().unwrap_or_default().bright_white()
        );
    }

    let output_dir = Utf8PathBuf::from(&args.output_dir);
    let report = Resguard::new(&whitelist, &prior, ResguardOptions::from(&config))
        .with_compress_data(compress_data)
        .run(&input_dir, &output_dir)
        .map_err(CliError::from)?;

    write_outputs(&report, &output_dir, config.merge_duplicated_res)?;
    print_summary(&report, &output_dir);
    Ok(())
}

/// The config file, if any, with command-line flags applied on top.
fn resolve_config(args: &ObfuscateArgs) -> Result<ResguardConfig> {
    let mut config = match &args.config_path {
        Some(path) => load_config(Utf8Path::new(path))?,
        None => ResguardConfig::default(),
    };
    if args.keep_root {
        config.keep_root = true;
    }
    if args.merge_duplicates {
        config.merge_duplicated_res = true;
    }
    if let Some(mapping) = &args.mapping {
        config.mapping = Some(mapping.clone());
    }
    Ok(config)
}

fn create_writer(path: &Utf8Path) -> Result<BufWriter<File>> {
    let file = File::create(path)
        .into_diagnostic()
        .with_context(|| format!("Failed to create {}", path))?;
    Ok(BufWriter::new(file))
}

fn write_outputs(report: &ResguardReport, output_dir: &Utf8Path, merged: bool) -> Result<()> {
    let mut writer = create_writer(&output_dir.join(MAPPING_FILE_NAME))?;
    report.write_mapping(&mut writer).into_diagnostic()?;
    writer.flush().into_diagnostic()?;

    if merged {
        let mut writer = create_writer(&output_dir.join(MERGE_LOG_FILE_NAME))?;
        report.write_merge_log(&mut writer).into_diagnostic()?;
        writer.flush().into_diagnostic()?;
    }

    if !report.compress_data.is_empty() {
        write_json_pretty(
            &output_dir.join(COMPRESS_DATA_FILE_NAME),
            &report.compress_data,
        )?;
    }
    Ok(())
}

fn print_summary(report: &ResguardReport, output_dir: &Utf8Path) {
    for warning in &report.warnings {
        println!("{} {}", "⚠️ ".yellow(), warning.to_string().yellow());
    }

    println!(
        "{} {} resources, {} directories, {} files",
        "✏️  Renamed:".bright_green(),
        report.renamed_count().to_string().bright_white().bold(),
        report
            .dir_mappings
            .iter()
            .filter(|(old, new)| old != new)
            .count()
            .to_string()
            .bright_white(),
        report
            .file_mappings
            .iter()
            .filter(|(old, new)| old != new)
            .count()
            .to_string()
            .bright_white()
    );
    if report.merges.removed_count > 0 {
        println!(
            "{} {} files, {} bytes",
            "🧹 Merged duplicates:".bright_green(),
            report.merges.removed_count.to_string().bright_white().bold(),
            report.merges.removed_bytes.to_string().bright_white()
        );
    }
    println!(
        "{} {}",
        "✅ Output written to".bright_green().bold(),
        output_dir.as_str().bright_cyan().bold()
    );
}
