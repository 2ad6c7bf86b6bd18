//! Session Bridge between the navigator (control side) and the task that
//! owns the live page (execution side).
//!
//! The control side sends [`Command`]s and gets one [`Reply`] per command.
//! Error events from the sentinel travel on a separate channel and are
//! always published before the reply of the navigation that caused them.

use std::collections::HashMap;
use std::sync::Arc;

use scraper::Html;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::driver::PageDriver;
use super::error::{HarvestError, HarvestResult};
use super::extract::{
    extract, BillRows, Extracted, Extraction, RawContract, RawContractDoc, RawIdentity,
    ScrapedLogin,
};
use super::html::has_body_content;
use super::layout::LayoutKind;
use super::sentinel::{PageEvent, Sentinel};
use super::wait::WaitPolicy;

const COMMAND_BUFFER: usize = 16;

/// Fixed set of operations the execution side performs.
#[derive(Debug, Clone)]
pub enum Command {
    Goto(String),
    Reload,
    CurrentUrl,
    HasBody,
    IsPresent(String),
    /// Index of the first selector present on the page, if any.
    FirstPresent(Vec<String>),
    Click(String),
    ClickAndWaitFor {
        click: String,
        result: String,
        policy: WaitPolicy,
    },
    Fill {
        selector: String,
        value: SecretString,
    },
    ClearBody,
    Surface,
    Cookies,
    DetectLayout,
    Extract {
        layout: LayoutKind,
        what: Extraction,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Goto(_) => "goto",
            Command::Reload => "reload",
            Command::CurrentUrl => "current_url",
            Command::HasBody => "has_body",
            Command::IsPresent(_) => "is_present",
            Command::FirstPresent(_) => "first_present",
            Command::Click(_) => "click",
            Command::ClickAndWaitFor { .. } => "click_and_wait_for",
            Command::Fill { .. } => "fill",
            Command::ClearBody => "clear_body",
            Command::Surface => "surface",
            Command::Cookies => "cookies",
            Command::DetectLayout => "detect_layout",
            Command::Extract { .. } => "extract",
        }
    }

    /// Commands that may load a new page. The sentinel runs after each.
    fn navigates(&self) -> bool {
        matches!(
            self,
            Command::Goto(_)
                | Command::Reload
                | Command::Click(_)
                | Command::ClickAndWaitFor { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Done,
    Url(String),
    Flag(bool),
    Index(Option<usize>),
    Cookies(HashMap<String, String>),
    Layout(LayoutKind),
    Extracted(Extracted),
}

struct Envelope {
    command: Command,
    reply: oneshot::Sender<anyhow::Result<Reply>>,
}

/// Execution side: owns the driver and the sentinel.
struct ExecutionContext {
    driver: Arc<dyn PageDriver>,
    sentinel: Sentinel,
    events: mpsc::UnboundedSender<PageEvent>,
    last_url: Option<String>,
}

impl ExecutionContext {
    async fn run(mut self, mut commands: mpsc::Receiver<Envelope>) {
        while let Some(Envelope { command, reply }) = commands.recv().await {
            debug!(command = command.name(), "Bridge command");
            let navigates = command.navigates();
            if navigates {
                self.sentinel.begin_load();
            }

            let result = self.execute(command).await;

            if navigates {
                self.last_url = self.driver.current_url().await.ok();
                self.scan().await;
            }
            // A dropped receiver means the control side lost interest in
            // this reply (a race it no longer waits on).
            let _ = reply.send(result);
        }
        debug!("Session bridge closed");
    }

    /// Run the sentinel against the current page and publish what it finds.
    async fn scan(&mut self) {
        let content = match self.driver.content().await {
            Ok(content) => content,
            Err(err) => {
                warn!(error = %err, "Could not read page for error detection");
                return;
            }
        };
        if let Some(event) = self.sentinel.inspect(&content) {
            debug!(kind = %event.kind, load = event.load, "Page error detected");
            let _ = self.events.send(event);
        }
    }

    async fn execute(&mut self, command: Command) -> anyhow::Result<Reply> {
        let driver = self.driver.as_ref();
        match command {
            Command::Goto(url) => driver.goto(&url).await.map(|_| Reply::Done),
            Command::Reload => driver.reload().await.map(|_| Reply::Done),
            Command::CurrentUrl => {
                let url = driver.current_url().await?;
                // The page moved without us (a human submitting a form):
                // that is a new load for the sentinel too.
                if self.last_url.as_deref() != Some(url.as_str()) {
                    self.last_url = Some(url.clone());
                    self.sentinel.begin_load();
                    self.scan().await;
                }
                Ok(Reply::Url(url))
            }
            Command::HasBody => {
                let content = driver.content().await?;
                Ok(Reply::Flag(has_body_content(&Html::parse_document(&content))))
            }
            Command::IsPresent(selector) => {
                driver.is_element_present(&selector).await.map(Reply::Flag)
            }
            Command::FirstPresent(selectors) => {
                for (index, selector) in selectors.iter().enumerate() {
                    if driver.is_element_present(selector).await? {
                        return Ok(Reply::Index(Some(index)));
                    }
                }
                Ok(Reply::Index(None))
            }
            Command::Click(selector) => driver.click(&selector).await.map(|_| Reply::Done),
            Command::ClickAndWaitFor {
                click,
                result,
                policy,
            } => driver
                .click_and_wait_for(&click, &result, policy)
                .await
                .map(Reply::Flag),
            Command::Fill { selector, value } => driver
                .fill(&selector, value.expose_secret())
                .await
                .map(|_| Reply::Done),
            Command::ClearBody => driver.clear_body().await.map(|_| Reply::Done),
            Command::Surface => driver.surface().await.map(|_| Reply::Done),
            Command::Cookies => driver.cookies().await.map(Reply::Cookies),
            Command::DetectLayout => {
                let content = driver.content().await?;
                Ok(Reply::Layout(LayoutKind::detect(&Html::parse_document(&content))))
            }
            Command::Extract { layout, what } => {
                extract(driver, layout, what).await.map(Reply::Extracted)
            }
        }
    }
}

/// Control-side handle. Cheap to clone; every call is one round trip.
#[derive(Clone)]
pub struct BridgeClient {
    commands: mpsc::Sender<Envelope>,
}

/// Error events published by the sentinel, in page-load order.
pub struct EventStream {
    events: mpsc::UnboundedReceiver<PageEvent>,
}

impl EventStream {
    /// Next event; `None` once the execution side is gone.
    pub async fn next(&mut self) -> Option<PageEvent> {
        self.events.recv().await
    }

    /// An already published event, without waiting.
    pub fn try_next(&mut self) -> Option<PageEvent> {
        self.events.try_recv().ok()
    }
}

/// Start the execution side for `driver`.
pub fn spawn(driver: Arc<dyn PageDriver>) -> (BridgeClient, EventStream, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let context = ExecutionContext {
        driver,
        sentinel: Sentinel::new(),
        events: event_tx,
        last_url: None,
    };
    let handle = tokio::spawn(context.run(command_rx));

    (
        BridgeClient {
            commands: command_tx,
        },
        EventStream { events: event_rx },
        handle,
    )
}

impl BridgeClient {
    pub async fn call(&self, command: Command) -> HarvestResult<Reply> {
        let (reply, receiver) = oneshot::channel();
        self.commands
            .send(Envelope { command, reply })
            .await
            .map_err(|_| HarvestError::BridgeClosed)?;
        let reply = receiver.await.map_err(|_| HarvestError::BridgeClosed)?;
        Ok(reply?)
    }

    async fn done(&self, command: Command) -> HarvestResult<()> {
        let name = command.name();
        match self.call(command).await? {
            Reply::Done => Ok(()),
            _ => Err(HarvestError::UnexpectedReply { command: name }),
        }
    }

    async fn flag(&self, command: Command) -> HarvestResult<bool> {
        let name = command.name();
        match self.call(command).await? {
            Reply::Flag(flag) => Ok(flag),
            _ => Err(HarvestError::UnexpectedReply { command: name }),
        }
    }

    async fn extracted(&self, layout: LayoutKind, what: Extraction) -> HarvestResult<Extracted> {
        match self.call(Command::Extract { layout, what }).await? {
            Reply::Extracted(extracted) => Ok(extracted),
            _ => Err(HarvestError::UnexpectedReply { command: "extract" }),
        }
    }

    pub async fn goto(&self, url: &str) -> HarvestResult<()> {
        self.done(Command::Goto(url.to_string())).await
    }

    pub async fn reload(&self) -> HarvestResult<()> {
        self.done(Command::Reload).await
    }

    pub async fn click(&self, selector: &str) -> HarvestResult<()> {
        self.done(Command::Click(selector.to_string())).await
    }

    pub async fn fill(&self, selector: &str, value: SecretString) -> HarvestResult<()> {
        self.done(Command::Fill {
            selector: selector.to_string(),
            value,
        })
        .await
    }

    pub async fn clear_body(&self) -> HarvestResult<()> {
        self.done(Command::ClearBody).await
    }

    pub async fn surface(&self) -> HarvestResult<()> {
        self.done(Command::Surface).await
    }

    pub async fn current_url(&self) -> HarvestResult<String> {
        match self.call(Command::CurrentUrl).await? {
            Reply::Url(url) => Ok(url),
            _ => Err(HarvestError::UnexpectedReply {
                command: "current_url",
            }),
        }
    }

    pub async fn has_body(&self) -> HarvestResult<bool> {
        self.flag(Command::HasBody).await
    }

    pub async fn is_present(&self, selector: &str) -> HarvestResult<bool> {
        self.flag(Command::IsPresent(selector.to_string())).await
    }

    pub async fn click_and_wait_for(
        &self,
        click: &str,
        result: &str,
        policy: WaitPolicy,
    ) -> HarvestResult<bool> {
        self.flag(Command::ClickAndWaitFor {
            click: click.to_string(),
            result: result.to_string(),
            policy,
        })
        .await
    }

    pub async fn first_present(&self, selectors: &[String]) -> HarvestResult<Option<usize>> {
        match self.call(Command::FirstPresent(selectors.to_vec())).await? {
            Reply::Index(index) => Ok(index),
            _ => Err(HarvestError::UnexpectedReply {
                command: "first_present",
            }),
        }
    }

    pub async fn cookies(&self) -> HarvestResult<HashMap<String, String>> {
        match self.call(Command::Cookies).await? {
            Reply::Cookies(cookies) => Ok(cookies),
            _ => Err(HarvestError::UnexpectedReply { command: "cookies" }),
        }
    }

    pub async fn detect_layout(&self) -> HarvestResult<LayoutKind> {
        match self.call(Command::DetectLayout).await? {
            Reply::Layout(layout) => Ok(layout),
            _ => Err(HarvestError::UnexpectedReply {
                command: "detect_layout",
            }),
        }
    }

    pub async fn login_form(&self) -> HarvestResult<Option<ScrapedLogin>> {
        match self.extracted(LayoutKind::Modern, Extraction::LoginForm).await? {
            Extracted::LoginForm(login) => Ok(login),
            _ => Err(HarvestError::UnexpectedReply { command: "extract" }),
        }
    }

    pub async fn contract_list(&self, layout: LayoutKind) -> HarvestResult<Vec<RawContract>> {
        match self.extracted(layout, Extraction::ContractList).await? {
            Extracted::ContractList(rows) => Ok(rows),
            _ => Err(HarvestError::UnexpectedReply { command: "extract" }),
        }
    }

    pub async fn home_contract(&self, layout: LayoutKind) -> HarvestResult<Option<RawContract>> {
        match self.extracted(layout, Extraction::HomeContract).await? {
            Extracted::HomeContract(row) => Ok(row),
            _ => Err(HarvestError::UnexpectedReply { command: "extract" }),
        }
    }

    pub async fn bills(&self, layout: LayoutKind) -> HarvestResult<BillRows> {
        match self.extracted(layout, Extraction::Bills).await? {
            Extracted::Bills(rows) => Ok(rows),
            _ => Err(HarvestError::UnexpectedReply { command: "extract" }),
        }
    }

    pub async fn contract_docs(&self, layout: LayoutKind) -> HarvestResult<Vec<RawContractDoc>> {
        match self.extracted(layout, Extraction::ContractDocs).await? {
            Extracted::ContractDocs(docs) => Ok(docs),
            _ => Err(HarvestError::UnexpectedReply { command: "extract" }),
        }
    }

    pub async fn identity(&self, layout: LayoutKind) -> HarvestResult<RawIdentity> {
        match self.extracted(layout, Extraction::Identity).await? {
            Extracted::Identity(identity) => Ok(identity),
            _ => Err(HarvestError::UnexpectedReply { command: "extract" }),
        }
    }
}
