use crate::error::ExportError;
use crate::models::Record;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Column ordering and exclusion policy. Preferred columns lead in policy
/// order; columns discovered from record data follow in first-seen order;
/// excluded columns are dropped entirely.
#[derive(Debug, Clone)]
pub struct ColumnPolicy {
    pub preferred: Vec<String>,
    pub excluded: Vec<String>,
}

impl Default for ColumnPolicy {
    fn default() -> Self {
        let preferred = [
            "ad_id",
            "title",
            "price",
            "location",
            "description",
            "link",
            "images",
            "seller_name",
            "seller_since",
            "seller_profile",
            "contact_name",
            "contact_phone",
            "contact_whatsapp",
            "contact_other_phones",
        ];
        let excluded = [
            "breadcrumb_path",
            "posted",
            "chat_available",
            "call_available",
            "thumbnail_image",
            "proxy_mobile",
            "roles",
        ];
        Self {
            preferred: preferred.iter().map(|s| s.to_string()).collect(),
            excluded: excluded.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Writes the merged record set to tabular and structured files. Each file
/// is written complete to a temporary path and renamed into place, so a
/// failure mid-write never leaves a truncated export behind.
pub struct Exporter {
    out_dir: PathBuf,
    policy: ColumnPolicy,
}

impl Exporter {
    pub fn new(out_dir: impl Into<PathBuf>, policy: ColumnPolicy) -> Self {
        Self {
            out_dir: out_dir.into(),
            policy,
        }
    }

    /// The full table: header columns plus one row of cells per record.
    /// Records are sorted by (location key, ad id) so output is stable
    /// regardless of worker completion order.
    pub fn table(&self, records: &[Record]) -> (Vec<String>, Vec<Vec<String>>) {
        let mut sorted: Vec<&Record> = records.iter().collect();
        sorted.sort_by(|a, b| {
            (&a.location_key, &a.ad_id).cmp(&(&b.location_key, &b.ad_id))
        });

        let rows: Vec<Vec<(String, String)>> = sorted.iter().map(|r| r.to_row()).collect();
        let columns = self.ordered_columns(&rows);

        let cells = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|col| {
                        row.iter()
                            .find(|(k, _)| k == col)
                            .map(|(_, v)| clean_value(v))
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();

        (columns, cells)
    }

    fn ordered_columns(&self, rows: &[Vec<(String, String)>]) -> Vec<String> {
        let mut discovered: Vec<String> = Vec::new();
        for row in rows {
            for (key, _) in row {
                if !discovered.contains(key) {
                    discovered.push(key.clone());
                }
            }
        }
        discovered.retain(|k| !self.policy.excluded.contains(k));

        let mut columns: Vec<String> = Vec::new();
        for preferred in &self.policy.preferred {
            if discovered.contains(preferred) {
                columns.push(preferred.clone());
            }
        }
        for key in discovered {
            if !columns.contains(&key) {
                columns.push(key);
            }
        }
        columns
    }

    pub fn export_tsv(&self, records: &[Record], basename: &str) -> Result<PathBuf, ExportError> {
        let path = self.target_path(basename, "tsv")?;
        let tmp = tmp_path(&path);
        let (columns, rows) = self.table(records);

        {
            let file = fs::File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
            let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(file);
            if !columns.is_empty() {
                writer.write_record(&columns)?;
                for row in &rows {
                    writer.write_record(row)?;
                }
            }
            writer.flush().map_err(|e| io_error(&tmp, e))?;
        }

        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))?;
        Ok(path)
    }

    pub fn export_json(&self, records: &[Record], basename: &str) -> Result<PathBuf, ExportError> {
        let path = self.target_path(basename, "json")?;
        let tmp = tmp_path(&path);
        let (columns, rows) = self.table(records);

        let objects: Vec<BTreeMap<&str, &str>> = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .zip(row.iter())
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect()
            })
            .collect();

        let body = serde_json::to_string_pretty(&objects)?;
        fs::write(&tmp, body).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))?;
        Ok(path)
    }

    fn target_path(&self, basename: &str, extension: &str) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(&self.out_dir).map_err(|e| io_error(&self.out_dir, e))?;
        Ok(self.out_dir.join(format!("{}.{}", basename, extension)))
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn io_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Trim whitespace and collapse the site's "N/A" placeholder to empty.
pub fn clean_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("n/a") {
        String::new()
    } else {
        trimmed.to_string()
    }
}
