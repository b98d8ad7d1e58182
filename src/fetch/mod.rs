// src/fetch/mod.rs
pub mod form;

use anyhow::{anyhow, Context, Result};
use reqwest::{header, Client};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};
use tempfile::NamedTempFile;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::error::FetchError;
use form::{Control, FormState};

pub const DEFAULT_QUERY_URL: &str = "https://www.imf.org/external/np/fin/tad/query.aspx";
pub const DEFAULT_SOURCE_FILE: &str = "BORROWINGS.xls";

const USER_AGENT: &str = concat!("nabimfd/", env!("CARGO_PKG_VERSION"));

// Element strategies per step, primary first.
const TRANSFER_ALL: &[&str] = &["a.rlbTransferAllFrom", "a[title='All to Right']"];
const COMMITMENTS_RADIO: &[&str] = &["#rbArrBorr"];
const BORROWINGS_RADIO: &[&str] = &[
    "#rbBorrowings",
    "input[value='BORROWINGS'][name='rblArrBorr']",
];
const BORROWING_TYPES: &[(&str, &str)] = &[
    ("#cblBorrowings_0", "GRA Borrowings"),
    ("#cblBorrowings_1", "PRGT Borrowings"),
    ("#cblBorrowings_2", "RST Borrowings"),
];
const CURRENT_RADIO: &[&str] = &[
    "#rbCurrent",
    "input[value='ACTIVE'][name='rblArrBorrOptions']",
];
const SUBMIT_BUTTON: &[&str] = &["#btnSubmit"];
const TSV_LINK: &[&str] = &["#lbnTSV"];

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub url: Url,
    pub downloads_dir: PathBuf,
    pub file_name: String,
    pub request_timeout: Duration,
    /// Pause between steps.
    pub step_delay: Duration,
}

impl FetchConfig {
    pub fn target_path(&self) -> PathBuf {
        self.downloads_dir.join(&self.file_name)
    }
}

/// The query tool workflow, in the order the form expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Navigate,
    SelectAllMembers,
    CommitmentsBorrowings,
    BorrowingsRadio,
    BorrowingTypes,
    CurrentOption,
    Submit,
    Download,
}

pub const WORKFLOW: [Step; 8] = [
    Step::Navigate,
    Step::SelectAllMembers,
    Step::CommitmentsBorrowings,
    Step::BorrowingsRadio,
    Step::BorrowingTypes,
    Step::CurrentOption,
    Step::Submit,
    Step::Download,
];

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Navigate => "navigate",
            Step::SelectAllMembers => "select all members",
            Step::CommitmentsBorrowings => "select commitments/borrowings",
            Step::BorrowingsRadio => "select borrowings",
            Step::BorrowingTypes => "select borrowing types",
            Step::CurrentOption => "select current",
            Step::Submit => "submit query",
            Step::Download => "download report",
        }
    }
}

/// One browser-less visit to the query form: the current page and the
/// values its form would post.
pub struct FormSession {
    client: Client,
    page_url: Url,
    html: String,
    form: Option<FormState>,
}

impl FormSession {
    pub fn new(client: Client, url: Url) -> Self {
        Self {
            client,
            page_url: url,
            html: String::new(),
            form: None,
        }
    }

    fn load_page(&mut self, url: Url, html: String) {
        self.form = form::parse_form(&html, &url);
        if self.form.is_none() {
            warn!(url = %url, "page has no form");
        }
        self.page_url = url;
        self.html = html;
    }

    fn form_mut(&mut self, step: &'static str) -> Result<&mut FormState, FetchError> {
        self.form.as_mut().ok_or(FetchError::MissingForm(step))
    }

    fn find(&self, step: &'static str, strategies: &[&'static str]) -> Result<Control, FetchError> {
        let control = form::locate(&self.html, strategies).ok_or_else(|| {
            FetchError::ElementNotFound {
                step,
                tried: strategies.to_vec(),
            }
        })?;
        if control.matched_by != strategies[0] {
            warn!(step, fallback = control.matched_by, "primary selector failed, used fallback");
        }
        Ok(control)
    }

    pub async fn navigate(&mut self) -> Result<()> {
        let url = self.page_url.clone();
        debug!(%url, "GET");
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {}", url))?
            .error_for_status()
            .with_context(|| format!("Non-success status {}", url))?;
        let final_url = resp.url().clone();
        let html = resp
            .text()
            .await
            .with_context(|| format!("reading body from {}", url))?;
        self.load_page(final_url, html);
        self.form_mut("navigate")?;
        Ok(())
    }

    /// POST the current form, with `__EVENTTARGET`/`__EVENTARGUMENT` and any
    /// extra pairs applied on top.
    async fn post(
        &mut self,
        step: &'static str,
        target: &str,
        argument: &str,
        extra: &[(String, String)],
    ) -> Result<reqwest::Response> {
        let referer = self.page_url.to_string();
        let form = self.form_mut(step)?;
        let mut fields = form.fields.clone();
        fields.set("__EVENTTARGET", target);
        fields.set("__EVENTARGUMENT", argument);
        for (name, value) in extra {
            fields.add(name, value);
        }
        let action = form.action.clone();

        debug!(%action, target, fields = fields.len(), "POST");
        let resp = self
            .client
            .post(action.clone())
            .header(header::REFERER, referer)
            .form(fields.pairs())
            .send()
            .await
            .with_context(|| format!("POST {}", action))?
            .error_for_status()
            .with_context(|| format!("Non-success status {}", action))?;
        Ok(resp)
    }

    /// Post back and replace the current page with the response.
    async fn postback(
        &mut self,
        step: &'static str,
        target: &str,
        argument: &str,
        extra: &[(String, String)],
    ) -> Result<()> {
        let resp = self.post(step, target, argument, extra).await?;
        let url = resp.url().clone();
        let html = resp.text().await.context("reading postback response")?;
        self.load_page(url, html);
        Ok(())
    }

    /// Check a radio button or checkbox, posting back when the control does.
    pub async fn check(&mut self, step: &'static str, strategies: &[&'static str]) -> Result<()> {
        let control = self.find(step, strategies)?;
        let name = control.name.clone().ok_or_else(|| FetchError::UnnamedControl {
            step,
            control: control.label(),
        })?;
        let value = control.submitted_value();

        let form = self.form_mut(step)?;
        if control.input_type.as_deref() == Some("checkbox") {
            if form.fields.contains(&name, &value) {
                info!(step, control = %control.label(), "[INFO] already selected");
                return Ok(());
            }
            form.fields.add(&name, &value);
        } else {
            form.fields.set(&name, &value);
        }

        if let Some((target, argument)) = control.postback() {
            self.postback(step, &target, &argument, &[]).await?;
        }
        Ok(())
    }

    /// Emulate the list box "transfer all" button.
    pub fn transfer_all(&mut self, step: &'static str, strategies: &[&'static str]) -> Result<usize> {
        let control = self.find(step, strategies)?;
        let transfer = form::transfer_all(&self.html, control.matched_by).ok_or_else(|| {
            FetchError::DeadControl {
                step,
                control: control.label(),
            }
        })?;

        let form = self.form_mut(step)?;
        form.fields.set(&transfer.source_state.0, &transfer.source_state.1);
        form.fields
            .set(&transfer.destination_state.0, &transfer.destination_state.1);
        Ok(transfer.items.len())
    }

    /// Press a submit button and load the resulting page.
    pub async fn press(&mut self, step: &'static str, strategies: &[&'static str]) -> Result<()> {
        let control = self.find(step, strategies)?;
        let name = control.name.clone().ok_or_else(|| FetchError::UnnamedControl {
            step,
            control: control.label(),
        })?;
        let value = control.value.clone().unwrap_or_default();
        self.postback(step, "", "", &[(name, value)]).await
    }

    /// Follow a download link and write the body to `dest`.
    pub async fn download(
        &mut self,
        step: &'static str,
        strategies: &[&'static str],
        dest: &Path,
    ) -> Result<PathBuf> {
        let control = self.find(step, strategies)?;
        let resp = match control.postback() {
            Some((target, argument)) => self.post(step, &target, &argument, &[]).await?,
            None => {
                let href = control
                    .href
                    .as_deref()
                    .filter(|h| !h.starts_with('#') && !h.starts_with("javascript:"))
                    .ok_or_else(|| FetchError::DeadControl {
                        step,
                        control: control.label(),
                    })?;
                let url = self.page_url.join(href)?;
                self.client
                    .get(url.clone())
                    .send()
                    .await
                    .with_context(|| format!("GET {}", url))?
                    .error_for_status()
                    .with_context(|| format!("Non-success status {}", url))?
            }
        };

        let bytes = resp.bytes().await.context("reading download body")?;
        if bytes.is_empty() || form::looks_like_html(&bytes) {
            return Err(FetchError::NotAReport.into());
        }
        write_atomic(dest, &bytes)?;
        info!(path = %dest.display(), bytes = bytes.len(), "[OK] file downloaded");
        Ok(dest.to_path_buf())
    }

    async fn run_step(&mut self, step: Step, cfg: &FetchConfig) -> Result<Option<PathBuf>> {
        let name = step.as_str();
        match step {
            Step::Navigate => self.navigate().await?,
            Step::SelectAllMembers => {
                let n = self.transfer_all(name, TRANSFER_ALL)?;
                info!(members = n, "selected all members and lenders");
            }
            Step::CommitmentsBorrowings => self.check(name, COMMITMENTS_RADIO).await?,
            Step::BorrowingsRadio => self.check(name, BORROWINGS_RADIO).await?,
            Step::BorrowingTypes => {
                let mut selected = 0;
                for &(css, label) in BORROWING_TYPES {
                    match self.check(name, &[css]).await {
                        Ok(()) => {
                            info!(label, "[OK] selected");
                            selected += 1;
                        }
                        Err(e) => warn!(label, error = %e, "[WARNING] could not select"),
                    }
                }
                if selected == 0 {
                    return Err(FetchError::NoBorrowingTypes.into());
                }
                info!(selected, "borrowing types selected");
            }
            Step::CurrentOption => self.check(name, CURRENT_RADIO).await?,
            Step::Submit => self.press(name, SUBMIT_BUTTON).await?,
            Step::Download => {
                let path = self.download(name, TSV_LINK, &cfg.target_path()).await?;
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).with_context(|| format!("creating {:?}", dir))?;
    let mut tmp =
        NamedTempFile::new_in(&dir).with_context(|| format!("creating temp file in {:?}", dir))?;
    tmp.write_all(bytes)
        .with_context(|| format!("writing {:?}", tmp.path()))?;
    tmp.persist(dest)
        .with_context(|| format!("renaming download to {:?}", dest))?;
    Ok(())
}

pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .cookie_store(true)
        .gzip(true)
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("building HTTP client")
}

/// Run the full query workflow and return the path of the downloaded report.
#[instrument(level = "info", skip(cfg), fields(url = %cfg.url))]
pub async fn fetch_report(cfg: &FetchConfig) -> Result<PathBuf> {
    let client = build_client(cfg.request_timeout)?;
    let mut session = FormSession::new(client, cfg.url.clone());
    let mut artifact = None;

    for (i, step) in WORKFLOW.iter().enumerate() {
        if i > 0 && !cfg.step_delay.is_zero() {
            sleep(cfg.step_delay).await;
        }
        info!("step {}/{}: {}", i + 1, WORKFLOW.len(), step.as_str());
        match session.run_step(*step, cfg).await {
            Ok(Some(path)) => artifact = Some(path),
            Ok(None) => {}
            Err(e) => {
                error!(step = step.as_str(), error = %e, "[ERROR] step failed, aborting workflow");
                return Err(e.context(format!("step `{}` failed", step.as_str())));
            }
        }
        info!("[OK] {}", step.as_str());
    }

    artifact.ok_or_else(|| anyhow!("workflow finished without downloading a report"))
}
