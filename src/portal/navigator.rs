//! Navigator: the control-side state machine of one harvest run.
//!
//! Every step that may load a page goes through [`Navigator::guarded`],
//! which races the step's expected outcome against sentinel events and
//! recovers (clear, reload, race the recovery markers) before retrying the
//! step from its start. Steps are therefore written to be safe to re-enter.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::bridge::{BridgeClient, EventStream};
use super::classify::{route_documents, Classifier};
use super::error::{HarvestError, HarvestResult};
use super::extract::{BillRows, RawContract, RawContractDoc, RawIdentity, ScrapedLogin};
use super::layout::LayoutKind;
use super::sentinel::{PageErrorKind, PageEvent};
use super::site::{
    classify_landing, page_url, Landing, ACCOUNT_LINK, ALT_CONTENT_MARKER, CAPTCHA,
    CONTENT_MARKER, CONTRACT_SELECTION, GO_BACK_LINK, LOGIN_ERROR, LOGIN_FORM, LOGIN_INPUT,
    LOGIN_PATH, LOGIN_SUBMIT, NOT_FOUND_IMAGE, PASSWORD_INPUT,
};
use super::wait::{poll_until, ManualWait, WaitPolicy};
use crate::clock::{Clock, SystemClock};
use crate::config::{ResolvedConfig, TimingConfig};
use crate::credentials::{AccountVault, PortalCredentials};
use crate::models::{ContractRef, Document, DocumentKind, Identity, PostalAddress};
use crate::storage::{DocumentSink, SaveOptions};

const PDF_CONTENT_TYPE: &str = "application/pdf";

// Content markers first: indices 0 and 1 mean the page came back.
const RECOVERY_MARKERS: [&str; 4] = [CONTENT_MARKER, ALT_CONTENT_MARKER, GO_BACK_LINK, NOT_FOUND_IMAGE];

/// What a run needs to know about the portal.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub base_url: String,
    pub vendor: String,
    pub timing: TimingConfig,
}

impl HarvestSettings {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            base_url: config.portal.base_url.clone(),
            vendor: config.portal.vendor.clone(),
            timing: config.timing.clone(),
        }
    }
}

/// A page error seen by the sentinel and not yet recovered from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingError {
    pub kind: PageErrorKind,
    pub payload: String,
    pub detected_at: DateTime<Utc>,
}

/// Raw rows of the contract being harvested. Replaced for every contract.
#[derive(Debug, Clone, Default)]
struct Harvest {
    bills: BillRows,
    contract_docs: Vec<RawContractDoc>,
}

/// Everything the navigator knows about the session. Only the navigator
/// mutates it.
#[derive(Debug, Default)]
struct SessionState {
    credentials: Option<PortalCredentials>,
    identity: Option<Identity>,
    /// Index 0 is the contract active at login.
    contract_refs: Vec<ContractRef>,
    /// While set, nothing is extracted and no step proceeds.
    pending_error: Option<PendingError>,
    /// Page errors a reload got rid of, oldest first.
    recovered: Vec<PendingError>,
    harvested: Harvest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Start,
    LoginFormVisible,
    AutoLoginAttempted,
    CaptchaRequired,
    ManualWait,
    Authenticated(Landing),
}

/// Where a contract sits in the iteration. Only the initial contract has
/// contract documents to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractPosition {
    Initial,
    Subsequent,
}

impl ContractPosition {
    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            ContractPosition::Initial
        } else {
            ContractPosition::Subsequent
        }
    }
}

/// Documents handed to persistence for one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractReport {
    pub contract: ContractRef,
    pub priced: usize,
    pub companion: usize,
    pub contract_documents: usize,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Email of the account holder, or the login when no email was found.
    pub source_account_identifier: String,
    pub contracts: Vec<ContractReport>,
    /// Browser cookies of the authenticated session.
    pub cookies: HashMap<String, String>,
    /// Page errors the run recovered from.
    pub recovered: Vec<PendingError>,
}

enum Navigation {
    /// Judge the page as it is.
    Stay,
    Goto(String),
    Click(String),
    ClickThrough {
        click: String,
        result: String,
    },
    SubmitLogin(PortalCredentials),
    /// Open the listing, wait for it, then use the row's switch control or,
    /// when the row has none because it is already active, go home.
    SwitchContract {
        list_url: String,
        contract_number: String,
        control: String,
        home_url: String,
    },
}

enum Expect {
    /// Index of the first marker that shows up.
    Any(Vec<String>),
    /// The contract listing with every row fully rendered.
    ListingReady,
}

impl Expect {
    fn any(markers: &[&str]) -> Self {
        Expect::Any(markers.iter().map(|m| m.to_string()).collect())
    }
}

enum Outcome {
    Marker(usize),
    Listing(Vec<RawContract>),
}

impl Outcome {
    fn rows(self) -> Vec<RawContract> {
        match self {
            Outcome::Listing(rows) => rows,
            Outcome::Marker(_) => Vec::new(),
        }
    }
}

struct Step {
    name: &'static str,
    navigation: Navigation,
    expect: Expect,
}

impl Step {
    fn new(name: &'static str, navigation: Navigation, expect: Expect) -> Self {
        Self {
            name,
            navigation,
            expect,
        }
    }
}

pub struct Navigator {
    bridge: BridgeClient,
    events: EventStream,
    vault: Arc<dyn AccountVault>,
    sink: Arc<dyn DocumentSink>,
    clock: Arc<dyn Clock>,
    classifier: Classifier,
    settings: HarvestSettings,
    policy: WaitPolicy,
    human: ManualWait,
    layout: LayoutKind,
    auth: AuthState,
    state: SessionState,
}

impl Navigator {
    pub fn new(
        bridge: BridgeClient,
        events: EventStream,
        vault: Arc<dyn AccountVault>,
        sink: Arc<dyn DocumentSink>,
        settings: HarvestSettings,
        cancel: CancellationToken,
    ) -> HarvestResult<Self> {
        let classifier = Classifier::new(settings.vendor.clone(), &settings.base_url)?;
        let policy = WaitPolicy::from_timing(&settings.timing);
        let human = ManualWait::new(settings.timing.poll_interval, cancel);

        Ok(Self {
            bridge,
            events,
            vault,
            sink,
            clock: Arc::new(SystemClock),
            classifier,
            settings,
            policy,
            human,
            layout: LayoutKind::Modern,
            auth: AuthState::Start,
            state: SessionState::default(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn run(mut self) -> HarvestResult<RunSummary> {
        let landing = self.authenticate().await?;
        info!(?landing, "Authenticated");

        let cookies = match self.bridge.cookies().await {
            Ok(cookies) => cookies,
            Err(err) => {
                warn!(error = %err, "Could not read session cookies");
                HashMap::new()
            }
        };
        self.sink.attach_session(&cookies).await?;

        self.discover_contracts().await?;

        let contracts = self.state.contract_refs.clone();
        let mut reports = Vec::with_capacity(contracts.len());
        for (index, contract) in contracts.iter().enumerate() {
            let position = ContractPosition::from_index(index);
            if position == ContractPosition::Subsequent {
                self.select_contract(contract).await?;
            }
            info!(contract = %contract.contract_number, index, "Harvesting contract");
            let documents = self.harvest_contract(position).await?;
            reports.push(self.persist(contract, documents).await?);
        }

        self.fetch_identity().await?;
        let source_account_identifier = self.source_account_identifier()?;

        Ok(RunSummary {
            source_account_identifier,
            contracts: reports,
            cookies,
            recovered: std::mem::take(&mut self.state.recovered),
        })
    }

    // ----- guarded steps and recovery -----

    async fn guarded(&mut self, step: Step) -> HarvestResult<Outcome> {
        let max = self.settings.timing.max_recoveries;
        let mut recoveries = 0;
        loop {
            self.ensure_clear().await?;

            let raced = {
                let running = attempt(&self.bridge, &step, self.layout, self.policy);
                tokio::select! {
                    biased;
                    Some(event) = self.events.next() => Err(event),
                    outcome = running => Ok(outcome),
                }
            };

            match raced {
                Ok(outcome) => return outcome,
                Err(event) => {
                    self.record(event)?;
                    recoveries += 1;
                    if recoveries > max {
                        return Err(HarvestError::VendorDown {
                            reason: format!("{} kept failing after {max} reloads", step.name),
                            kind: self.state.pending_error.as_ref().map(|p| p.kind),
                        });
                    }
                    debug!(step = step.name, recoveries, "Step interrupted by a page error");
                }
            }
        }
    }

    fn is_authenticated(&self) -> bool {
        matches!(self.auth, AuthState::Authenticated(_))
    }

    fn record(&mut self, event: PageEvent) -> HarvestResult<()> {
        if event.kind == PageErrorKind::MaintenanceMode && !self.is_authenticated() {
            return Err(HarvestError::VendorDown {
                reason: format!("maintenance announced before login: {}", event.payload),
                kind: Some(event.kind),
            });
        }
        warn!(kind = %event.kind, payload = %event.payload, load = event.load, "Page error");
        self.state.pending_error = Some(PendingError {
            kind: event.kind,
            payload: event.payload,
            detected_at: self.clock.now(),
        });
        Ok(())
    }

    fn absorb_events(&mut self) -> HarvestResult<()> {
        while let Some(event) = self.events.try_next() {
            self.record(event)?;
        }
        Ok(())
    }

    /// Resolve any pending page error before going further.
    async fn ensure_clear(&mut self) -> HarvestResult<()> {
        self.absorb_events()?;
        if self.state.pending_error.is_some() {
            self.recover().await?;
        }
        Ok(())
    }

    async fn recover(&mut self) -> HarvestResult<()> {
        let Some(pending) = self.state.pending_error.clone() else {
            return Ok(());
        };
        info!(kind = %pending.kind, detected_at = %pending.detected_at, "Reloading after page error");

        self.bridge.clear_body().await?;
        self.bridge.reload().await?;

        let markers: Vec<String> = RECOVERY_MARKERS.iter().map(|m| m.to_string()).collect();
        let raced = {
            let bridge = &self.bridge;
            let reloaded = poll_until(self.policy, "page content after reload", || {
                bridge.first_present(&markers)
            });
            tokio::select! {
                biased;
                Some(event) = self.events.next() => Err(event),
                found = reloaded => Ok(found),
            }
        };

        match raced {
            Err(event) => Err(HarvestError::VendorDown {
                reason: format!("{} persisted after reload", event.kind),
                kind: Some(event.kind),
            }),
            Ok(Ok(0 | 1)) => {
                self.state.pending_error = None;
                info!(kind = %pending.kind, "Page recovered after reload");
                self.state.recovered.push(pending);
                Ok(())
            }
            Ok(Ok(_)) => Err(HarvestError::VendorDown {
                reason: "the portal shows an error page after reload".to_string(),
                kind: Some(pending.kind),
            }),
            Ok(Err(HarvestError::Timeout { what, waited })) => {
                if self.bridge.has_body().await? {
                    Err(HarvestError::Timeout { what, waited })
                } else {
                    Err(HarvestError::VendorDown {
                        reason: "page has no body after reload".to_string(),
                        kind: Some(pending.kind),
                    })
                }
            }
            Ok(Err(err)) => Err(err),
        }
    }

    // ----- authentication -----

    fn set_auth(&mut self, state: AuthState) {
        if self.auth != state {
            debug!(from = ?self.auth, to = ?state, "Authentication state");
            self.auth = state;
        }
    }

    fn authenticated(&mut self, landing: Landing) -> Landing {
        self.set_auth(AuthState::Authenticated(landing));
        landing
    }

    async fn authenticate(&mut self) -> HarvestResult<Landing> {
        self.set_auth(AuthState::Start);
        self.state.credentials = self.vault.get_credentials().await?;

        let login_url = page_url(&self.settings.base_url, LOGIN_PATH);
        self.guarded(Step::new(
            "login page",
            Navigation::Goto(login_url),
            Expect::any(&[CONTRACT_SELECTION, ACCOUNT_LINK, LOGIN_FORM]),
        ))
        .await?;
        if let Some(landing) = read_landing(&self.bridge).await? {
            return Ok(self.authenticated(landing));
        }
        self.set_auth(AuthState::LoginFormVisible);

        let credentials = self
            .state
            .credentials
            .clone()
            .filter(|_| self.vault.account_present());
        if let Some(credentials) = credentials {
            self.set_auth(AuthState::AutoLoginAttempted);
            let submitted = self
                .guarded(Step::new(
                    "login submission",
                    Navigation::SubmitLogin(credentials),
                    Expect::any(&[CONTRACT_SELECTION, ACCOUNT_LINK, CAPTCHA, LOGIN_ERROR]),
                ))
                .await;

            match submitted {
                Ok(Outcome::Marker(3)) => {
                    return Err(HarvestError::AuthenticationFailed(
                        "the portal rejected the stored login".to_string(),
                    ))
                }
                Ok(Outcome::Marker(2)) => {
                    self.set_auth(AuthState::CaptchaRequired);
                    info!("CAPTCHA shown after login submission");
                }
                Ok(_) => {
                    if let Some(landing) = read_landing(&self.bridge).await? {
                        return Ok(self.authenticated(landing));
                    }
                }
                Err(HarvestError::Timeout { .. }) => {
                    warn!("No reaction to the login submission");
                }
                Err(err) => return Err(err),
            }
        }

        let landing = self.wait_for_human().await?;
        Ok(self.authenticated(landing))
    }

    /// Hand the page to a human until an authenticated page shows up.
    async fn wait_for_human(&mut self) -> HarvestResult<Landing> {
        self.set_auth(AuthState::ManualWait);
        self.bridge.surface().await?;
        info!("Waiting for the login to be completed in the browser");

        let mut scraped = None;
        let landing = loop {
            let (landing, login) = self.human.guard(human_check(&self.bridge)).await?;
            self.drain_during_wait()?;
            if login.is_some() {
                scraped = login;
            }
            if let Some(landing) = landing {
                break landing;
            }
            self.human.pause().await?;
        };

        if let Some(login) = scraped {
            self.adopt_scraped(login).await;
        }
        Ok(landing)
    }

    /// Pages the human goes through are theirs to fix; only maintenance ends
    /// the run.
    fn drain_during_wait(&mut self) -> HarvestResult<()> {
        while let Some(event) = self.events.try_next() {
            if event.kind == PageErrorKind::MaintenanceMode {
                return self.record(event);
            }
            debug!(kind = %event.kind, "Page error during manual login; ignored");
        }
        Ok(())
    }

    async fn adopt_scraped(&mut self, login: ScrapedLogin) {
        let unchanged = self.state.credentials.as_ref().is_some_and(|known| {
            known.login == login.login
                && known.secret.expose_secret() == login.secret.expose_secret()
        });
        if unchanged {
            return;
        }

        let credentials = PortalCredentials {
            login: login.login,
            secret: login.secret,
        };
        match self.vault.save_credentials(&credentials).await {
            Ok(()) => info!(login = %credentials.login, "Saved login typed into the portal"),
            Err(err) => warn!(error = %err, "Could not save scraped login"),
        }
        self.state.credentials = Some(credentials);
    }

    // ----- contracts -----

    async fn discover_contracts(&mut self) -> HarvestResult<()> {
        self.layout = self.bridge.detect_layout().await?;
        info!(layout = ?self.layout, "Detected site generation");
        let markers = self.layout.layout().markers();

        let shape = self
            .guarded(Step::new(
                "landing page",
                Navigation::Stay,
                Expect::any(&[markers.contract_list, markers.manage_accounts, markers.home]),
            ))
            .await?;

        let rows = match shape {
            Outcome::Marker(0) => self
                .guarded(Step::new("contract listing", Navigation::Stay, Expect::ListingReady))
                .await?
                .rows(),
            Outcome::Marker(1) => self
                .guarded(Step::new(
                    "contract listing",
                    Navigation::ClickThrough {
                        click: markers.manage_accounts.to_string(),
                        result: markers.contract_list.to_string(),
                    },
                    Expect::ListingReady,
                ))
                .await?
                .rows(),
            _ => {
                self.ensure_clear().await?;
                self.bridge.home_contract(self.layout).await?.into_iter().collect()
            }
        };

        let refs = contract_refs(rows);
        if refs.is_empty() {
            return Err(HarvestError::MalformedSourceData(
                "no contract could be read after login".to_string(),
            ));
        }
        info!(count = refs.len(), "Contracts discovered");
        self.state.contract_refs = refs;
        Ok(())
    }

    async fn select_contract(&mut self, contract: &ContractRef) -> HarvestResult<()> {
        let layout = self.layout.layout();
        let base = &self.settings.base_url;
        let step = Step::new(
            "contract switch",
            Navigation::SwitchContract {
                list_url: page_url(base, layout.paths().contract_list),
                contract_number: contract.contract_number.clone(),
                control: layout.switch_control(&contract.contract_number),
                home_url: page_url(base, layout.paths().home),
            },
            Expect::any(&[layout.markers().home]),
        );
        self.guarded(step).await?;
        info!(contract = %contract.contract_number, "Switched contract");
        Ok(())
    }

    async fn harvest_contract(&mut self, position: ContractPosition) -> HarvestResult<Vec<Document>> {
        let layout = self.layout.layout();
        self.guarded(Step::new(
            "bills page",
            Navigation::Goto(page_url(&self.settings.base_url, layout.paths().bills)),
            Expect::any(&[layout.markers().bills]),
        ))
        .await?;
        self.ensure_clear().await?;
        let bills = self.bridge.bills(self.layout).await?;

        let contract_docs = match position {
            ContractPosition::Initial => self.contract_documents().await?,
            ContractPosition::Subsequent => Vec::new(),
        };
        self.state.harvested = Harvest {
            bills,
            contract_docs,
        };

        let mut documents = self.classifier.bills(&self.state.harvested.bills);
        documents.extend(self.classifier.contracts(&self.state.harvested.contract_docs));
        Ok(documents)
    }

    async fn contract_documents(&mut self) -> HarvestResult<Vec<RawContractDoc>> {
        let layout = self.layout.layout();
        let (Some(path), Some(marker)) = (layout.paths().contract_docs, layout.markers().contract_docs)
        else {
            debug!("This site generation has no contract document page");
            return Ok(Vec::new());
        };

        let step = Step::new(
            "contract documents",
            Navigation::Goto(page_url(&self.settings.base_url, path)),
            Expect::any(&[marker]),
        );
        match self.guarded(step).await {
            Ok(_) => {}
            Err(HarvestError::Timeout { what, waited }) => {
                warn!(what = %what, ?waited, "Contract documents page did not render");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        }
        self.ensure_clear().await?;
        self.bridge.contract_docs(self.layout).await
    }

    async fn persist(&self, contract: &ContractRef, documents: Vec<Document>) -> HarvestResult<ContractReport> {
        let mut report = ContractReport {
            contract: contract.clone(),
            priced: 0,
            companion: 0,
            contract_documents: 0,
        };

        let mut groups: BTreeMap<(&'static str, DocumentKind), Vec<Document>> = BTreeMap::new();
        for document in documents {
            groups
                .entry((document.category(), document.kind()))
                .or_default()
                .push(document);
        }

        for ((category, kind), documents) in groups {
            let options = SaveOptions {
                file_id_attributes: kind
                    .file_id_attributes()
                    .iter()
                    .map(|a| a.to_string())
                    .collect(),
                sub_path: contract.sub_path(category),
                content_type: PDF_CONTENT_TYPE.to_string(),
                qualification_label: kind.qualification_label().to_string(),
            };
            let routed = route_documents(documents);

            if !routed.priced.is_empty() {
                self.sink.save_bills(&routed.priced, &options).await?;
            }
            if !routed.companion.is_empty() {
                self.sink.save_files(&routed.companion, &options).await?;
            }

            report.priced += routed.priced.len();
            if kind == DocumentKind::ContractPdf {
                report.contract_documents += routed.companion.len();
            } else {
                report.companion += routed.companion.len();
            }
        }

        info!(
            contract = %contract.contract_number,
            priced = report.priced,
            companion = report.companion,
            contracts = report.contract_documents,
            "Handed documents to storage"
        );
        Ok(report)
    }

    // ----- identity -----

    async fn fetch_identity(&mut self) -> HarvestResult<()> {
        let layout = self.layout.layout();
        let markers = layout.markers();
        let attempts = self.settings.timing.contact_attempts.max(1);

        for attempt in 1..=attempts {
            let navigation = if self.bridge.is_present(markers.identity_link).await? {
                Navigation::Click(markers.identity_link.to_string())
            } else {
                debug!(error = %HarvestError::MissingIdentityLink, "Opening the contact page by URL");
                Navigation::Goto(page_url(&self.settings.base_url, layout.paths().identity))
            };

            let reached = self
                .guarded(Step::new(
                    "contact information",
                    navigation,
                    Expect::any(&[markers.identity_title]),
                ))
                .await;

            let failure = match reached {
                Ok(_) => {
                    self.ensure_clear().await?;
                    let identity = identity_from(self.bridge.identity(self.layout).await?);
                    if !identity.is_empty() {
                        self.store_identity(identity).await;
                        return Ok(());
                    }
                    "contact information page is empty".to_string()
                }
                Err(err @ (HarvestError::VendorDown { .. } | HarvestError::Cancelled)) => {
                    return Err(err)
                }
                Err(err) => err.to_string(),
            };
            warn!(attempt, remaining = attempts - attempt, error = %failure, "Contact information not reached");
        }

        warn!(error = %HarvestError::MissingIdentityLink, "Giving up on contact information; falling back to the login");
        Ok(())
    }

    async fn store_identity(&mut self, identity: Identity) {
        if let Err(err) = self.vault.save_identity(&identity).await {
            warn!(error = %err, "Could not save identity");
        }
        self.state.identity = Some(identity);
    }

    fn source_account_identifier(&self) -> HarvestResult<String> {
        self.state
            .identity
            .as_ref()
            .and_then(|identity| identity.email.clone())
            .or_else(|| self.state.credentials.as_ref().map(|c| c.login.clone()))
            .ok_or(HarvestError::NoAccountIdentifier)
    }
}

/// One attempt at a step: perform its navigation, then wait for its outcome.
async fn attempt(
    bridge: &BridgeClient,
    step: &Step,
    layout: LayoutKind,
    policy: WaitPolicy,
) -> HarvestResult<Outcome> {
    match &step.navigation {
        Navigation::Stay => {}
        Navigation::Goto(url) => bridge.goto(url).await?,
        Navigation::Click(selector) => bridge.click(selector).await?,
        Navigation::ClickThrough { click, result } => {
            if !bridge.click_and_wait_for(click, result, policy).await? {
                return Err(HarvestError::Timeout {
                    what: result.clone(),
                    waited: policy.timeout,
                });
            }
        }
        Navigation::SubmitLogin(credentials) => {
            bridge
                .fill(LOGIN_INPUT, SecretString::from(credentials.login.clone()))
                .await?;
            bridge.fill(PASSWORD_INPUT, credentials.secret.clone()).await?;
            bridge.click(LOGIN_SUBMIT).await?;
        }
        Navigation::SwitchContract {
            list_url,
            contract_number,
            control,
            home_url,
        } => {
            bridge.goto(list_url).await?;
            let rows = listing_ready(bridge, layout, policy).await?;
            if bridge.is_present(control).await? {
                bridge.click(control).await?;
            } else if is_active(&rows, contract_number) {
                debug!(contract = %contract_number, "Contract already active; going home");
                bridge.goto(home_url).await?;
            } else {
                return Err(HarvestError::ContractUnreachable(contract_number.clone()));
            }
        }
    }

    match &step.expect {
        Expect::Any(markers) => poll_until(policy, step.name, || bridge.first_present(markers))
            .await
            .map(Outcome::Marker),
        Expect::ListingReady => listing_ready(bridge, layout, policy).await.map(Outcome::Listing),
    }
}

/// The listing, once every row shows both its address and client reference.
async fn listing_ready(
    bridge: &BridgeClient,
    layout: LayoutKind,
    policy: WaitPolicy,
) -> HarvestResult<Vec<RawContract>> {
    poll_until(policy, "contract listing to finish rendering", move || async move {
        let rows = bridge.contract_list(layout).await?;
        let ready = !rows.is_empty() && rows.iter().all(RawContract::is_resolved);
        Ok(ready.then_some(rows))
    })
    .await
}

fn is_active(rows: &[RawContract], contract_number: &str) -> bool {
    rows.iter()
        .any(|row| row.active && row.number.as_deref() == Some(contract_number))
}

async fn read_landing(bridge: &BridgeClient) -> HarvestResult<Option<Landing>> {
    let url = bridge.current_url().await?;
    let account_link = bridge.is_present(ACCOUNT_LINK).await?;
    let contract_selection = bridge.is_present(CONTRACT_SELECTION).await?;
    Ok(classify_landing(&url, account_link, contract_selection))
}

async fn human_check(bridge: &BridgeClient) -> HarvestResult<(Option<Landing>, Option<ScrapedLogin>)> {
    if let Some(landing) = read_landing(bridge).await? {
        return Ok((Some(landing), None));
    }
    let login = if bridge.is_present(LOGIN_FORM).await? {
        bridge.login_form().await?
    } else {
        None
    };
    Ok((None, login))
}

/// Active contract first, then the others in page order. Rows without a
/// number cannot be selected and are skipped.
fn contract_refs(rows: Vec<RawContract>) -> Vec<ContractRef> {
    let (active, others): (Vec<_>, Vec<_>) = rows.into_iter().partition(|row| row.active);
    active
        .into_iter()
        .chain(others)
        .filter_map(|row| match row.number {
            Some(number) => Some(ContractRef::new(number, row.address.unwrap_or_default())),
            None => {
                let err = HarvestError::MalformedSourceData("contract row without a number".to_string());
                warn!(error = %err, "Skipping contract");
                None
            }
        })
        .collect()
}

fn identity_from(raw: RawIdentity) -> Identity {
    Identity {
        name: raw.name,
        email: raw.email,
        phones: raw.phones,
        addresses: raw
            .addresses
            .into_iter()
            .map(|(formatted, contract_number)| PostalAddress {
                formatted,
                contract_number,
            })
            .collect(),
    }
}
