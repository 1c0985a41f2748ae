use camino::Utf8Path;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::time::Instant;
use tempfile::NamedTempFile;

use resguard_config::{ResguardConfig, Whitelist, DEFAULT_RES_DIR_NAME};

use crate::decode::{DecodeContext, TableDecoder};
use crate::encode::TableEncoder;
use crate::error::Result;
use crate::mapping::PriorMapping;
use crate::prescan::PreScan;
use crate::report::ResguardReport;
use crate::res_dir::ResDirMap;

/// File name of the resource table inside an unpacked APK.
pub const RESOURCES_ARSC: &str = "resources.arsc";

/// Switches for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResguardOptions {
    pub keep_root: bool,
    pub merge_duplicates: bool,
    pub strict_missing_files: bool,
    pub res_dir_name: String,
}

impl Default for ResguardOptions {
    fn default() -> Self {
        Self {
            keep_root: false,
            merge_duplicates: false,
            strict_missing_files: false,
            res_dir_name: DEFAULT_RES_DIR_NAME.to_string(),
        }
    }
}

impl From<&ResguardConfig> for ResguardOptions {
    fn from(config: &ResguardConfig) -> Self {
        Self {
            keep_root: config.keep_root,
            merge_duplicates: config.merge_duplicated_res,
            strict_missing_files: config.strict_missing_files,
            res_dir_name: config.res_dir_name.clone(),
        }
    }
}

/// Obfuscates the resource table of one unpacked APK.
///
/// The input directory must contain `resources.arsc` and the `res/` tree it
/// references. The output directory receives the rewritten table and the
/// renamed resource files.
pub struct Resguard<'a> {
    whitelist: &'a Whitelist,
    prior: &'a PriorMapping,
    options: ResguardOptions,
    compress_data: BTreeMap<String, bool>,
}

impl<'a> Resguard<'a> {
    pub fn new(whitelist: &'a Whitelist, prior: &'a PriorMapping, options: ResguardOptions) -> Self {
        Self {
            whitelist,
            prior,
            options,
            compress_data: BTreeMap::new(),
        }
    }

    /// Per-path compression flags of the input archive. Renamed paths inherit
    /// the flag of their original path.
    pub fn with_compress_data(mut self, compress_data: BTreeMap<String, bool>) -> Self {
        self.compress_data = compress_data;
        self
    }

    pub fn options(&self) -> &ResguardOptions {
        &self.options
    }

    pub fn run(self, input_root: &Utf8Path, output_root: &Utf8Path) -> Result<ResguardReport> {
        let start = Instant::now();
        let table_path = input_root.join(RESOURCES_ARSC);
        fs::create_dir_all(output_root)?;

        let existing = PreScan::scan(&mut BufReader::new(File::open(&table_path)?))?;
        tracing::debug!("pre-scan found {} packages", existing.packages().len());

        let dirs = ResDirMap::build(
            input_root,
            self.options.keep_root,
            &self.options.res_dir_name,
            self.prior,
        )?;

        let decoder = TableDecoder::new(
            DecodeContext {
                whitelist: self.whitelist,
                prior: self.prior,
                existing: &existing,
                dirs: &dirs,
                options: &self.options,
                input_root,
                output_root,
            },
            self.compress_data,
        );
        let (decoded, report) = decoder.decode(&mut BufReader::new(File::open(&table_path)?))?;

        let mut temp = NamedTempFile::new_in(output_root)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            TableEncoder::new(&decoded)
                .encode(&mut BufReader::new(File::open(&table_path)?), &mut writer)?;
            writer.flush()?;
        }
        temp.persist(output_root.join(RESOURCES_ARSC)).map_err(|e| e.error)?;

        tracing::info!(
            "Resource table rewritten dst={} renamed={} dirs={} files={} merged={} warnings={} elapsed_ms={}",
            output_root,
            report.renamed_count(),
            report.dir_mappings.len(),
            report.file_mappings.len(),
            report.merges.removed_count,
            report.warnings.len(),
            start.elapsed().as_millis()
        );
        Ok(report)
    }
}
