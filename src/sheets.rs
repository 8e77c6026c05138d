use crate::config::SheetsConfig;
use crate::error::SheetError;
use serde_json::Value;
use std::time::Duration;

// Rows uploaded per values request.
const BATCH_ROWS: usize = 500;

/// Uploads the exported table to a Google Sheets spreadsheet over the REST
/// API, using an OAuth bearer token obtained out of band. Clears the target
/// sheet, then writes header plus rows in batches.
pub struct SheetsClient {
    client: reqwest::Client,
    token: String,
    spreadsheet_id: String,
}

impl SheetsClient {
    pub fn from_config(config: &SheetsConfig, timeout_secs: u64) -> Result<Self, SheetError> {
        if config.spreadsheet_id.trim().is_empty() {
            return Err(SheetError::Token("spreadsheet_id is not set".to_string()));
        }
        let token = read_token(&config.token_file)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            token,
            spreadsheet_id: config.spreadsheet_id.clone(),
        })
    }

    /// Replace the named sheet's contents with the given table and return
    /// the shareable spreadsheet URL.
    pub async fn export(
        &self,
        sheet_name: &str,
        columns: &[String],
        rows: Vec<Vec<String>>,
    ) -> Result<String, SheetError> {
        self.clear(sheet_name).await?;

        let mut values: Vec<Vec<String>> = Vec::with_capacity(rows.len() + 1);
        values.push(columns.to_vec());
        values.extend(rows);

        let mut start_row = 1usize;
        for chunk in values.chunks(BATCH_ROWS) {
            let range = format!("'{}'!A{}", sheet_name, start_row);
            let url = format!(
                "{}/values/{}?valueInputOption=USER_ENTERED",
                self.base_url(),
                urlencoding::encode(&range)
            );
            let response = self
                .client
                .put(&url)
                .bearer_auth(&self.token)
                .json(&serde_json::json!({ "values": chunk }))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(SheetError::Api {
                    status: status.as_u16(),
                    context: format!("values update at row {}", start_row),
                });
            }
            start_row += chunk.len();
        }

        Ok(format!(
            "https://docs.google.com/spreadsheets/d/{}",
            self.spreadsheet_id
        ))
    }

    async fn clear(&self, sheet_name: &str) -> Result<(), SheetError> {
        let range = clear_range(sheet_name);
        let url = format!(
            "{}/values/{}:clear",
            self.base_url(),
            urlencoding::encode(&range)
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SheetError::Api {
                status: status.as_u16(),
                context: "sheet clear".to_string(),
            });
        }
        Ok(())
    }

    fn base_url(&self) -> String {
        format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}",
            self.spreadsheet_id
        )
    }
}

fn clear_range(sheet_name: &str) -> String {
    format!("'{}'!A:ZZ", sheet_name)
}

/// Read the bearer token from disk. Accepts the JSON token file the OAuth
/// flow saves ("token" or "access_token" field) or a file holding the raw
/// token string.
fn read_token(path: &str) -> Result<String, SheetError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SheetError::Token(format!("{}: {}", path, e)))?;

    if let Ok(parsed) = serde_json::from_str::<Value>(&raw) {
        for key in ["access_token", "token"] {
            if let Some(token) = parsed.get(key).and_then(Value::as_str) {
                if !token.trim().is_empty() {
                    return Ok(token.trim().to_string());
                }
            }
        }
        return Err(SheetError::Token(format!(
            "{}: no usable token field",
            path
        )));
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SheetError::Token(format!("{}: file is empty", path)));
    }
    Ok(trimmed.to_string())
}
