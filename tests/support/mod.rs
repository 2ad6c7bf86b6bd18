#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use billharvest::config::TimingConfig;
use billharvest::portal::{HarvestSettings, PageDriver};
use scraper::{Html, Selector};

pub const BASE: &str = "https://portal.test";

pub const LOGIN: &str = "/clients/connexion";
pub const WELCOME: &str = "/clients/mon-compte/bienvenue";
pub const HOME: &str = "/clients/mon-compte";
pub const CONTRACTS: &str = "/clients/mon-compte/mes-contrats";
pub const BILLS: &str = "/clients/mes-factures";
pub const CONTRACT_DOCS: &str = "/clients/mon-contrat";
pub const INFOS: &str = "/clients/mon-compte/mes-infos";
pub const LOGIN_REJECTED: &str = "/clients/connexion/erreur";

pub const LEGACY_BILLS: &str = "/mes-factures/ma-facture-mon-echeancier/";
pub const LEGACY_INFOS: &str = "/mon-compte/mes-infos";

pub const SUBMIT: &str = "form.login-form button[type=\"submit\"]";
pub const INFOS_LINK: &str = "a.header-account__infos";
pub const MANAGE_LINK: &str = "a.header-account__manage";

pub const SERVICE_UNAVAILABLE: &str = "<html><head><title>503 Service Unavailable</title></head>\
    <body><h1>Service Unavailable</h1></body></html>";

pub const GO_BACK_PAGE: &str = "<html><head><title>Oups</title></head><body>\
    <h1>Une erreur est survenue</h1><a class=\"error-page__back\" href=\"/\">Retour</a></body></html>";

pub const MAINTENANCE_PAGE: &str = "<html><head><title>Espace client</title></head><body>\
    <div id=\"maintenance\">Notre site est en maintenance</div></body></html>";

pub fn url(path: &str) -> String {
    format!("{BASE}{path}")
}

/// Short waits so failing scenarios end quickly.
pub fn settings() -> HarvestSettings {
    HarvestSettings {
        base_url: BASE.to_string(),
        vendor: "Direct Energie".to_string(),
        timing: TimingConfig {
            poll_interval: Duration::from_millis(5),
            poll_timeout: Duration::from_millis(500),
            run_timeout: Some(Duration::from_secs(20)),
            contact_attempts: 2,
            max_recoveries: 2,
        },
    }
}

fn header() -> &'static str {
    r#"<header>
  <a class="header-account" href="/clients/mon-compte">Mon compte</a>
  <a class="header-account__manage" href="/clients/mon-compte/mes-contrats">Gérer mes contrats</a>
  <a class="header-account__infos" href="/clients/mon-compte/mes-infos">Mes infos</a>
</header>"#
}

/// Wrap the body of an authenticated page.
pub fn authenticated(title: &str, body: &str) -> String {
    format!(
        "<html><head><title>{title}</title></head><body>{}<main id=\"page-content\">{body}</main></body></html>",
        header()
    )
}

pub fn login_page() -> String {
    r#"<html><head><title>Connexion</title></head><body>
<form class="login-form">
  <input name="login" type="text">
  <input name="password" type="password">
  <button type="submit">Se connecter</button>
</form></body></html>"#
        .to_string()
}

pub fn rejected_login_page() -> String {
    r#"<html><head><title>Connexion</title></head><body>
<form class="login-form">
  <p class="formlabel-left error">Identifiant ou mot de passe incorrect</p>
  <input name="login" type="text">
  <input name="password" type="password">
  <button type="submit">Se connecter</button>
</form></body></html>"#
        .to_string()
}

pub struct ListedContract<'a> {
    pub number: &'a str,
    pub address: &'a str,
    pub active: bool,
}

/// Contract listing with a switch control on every inactive row.
pub fn listing(contracts: &[ListedContract<'_>]) -> String {
    listing_with(contracts, |c| !c.active)
}

/// Contract listing with a switch control on the rows `switchable` picks.
pub fn listing_with(
    contracts: &[ListedContract<'_>],
    switchable: impl Fn(&ListedContract<'_>) -> bool,
) -> String {
    let items: String = contracts
        .iter()
        .map(|c| {
            let class = if c.active {
                "contract-selection__item is-active"
            } else {
                "contract-selection__item"
            };
            let switch = if switchable(c) {
                format!(
                    r#"<button class="contract-selection__switch" data-contract-number="{}">Accéder</button>"#,
                    c.number
                )
            } else {
                String::new()
            };
            format!(
                r#"<div class="{class}" data-contract-number="{}">
  <p class="contract-selection__address">{}</p>
  <p class="contract-selection__client-ref">5550001</p>
  {switch}
</div>"#,
                c.number, c.address
            )
        })
        .collect();
    authenticated(
        "Mes contrats",
        &format!(r#"<div class="contract-selection">{items}</div>"#),
    )
}

pub fn dashboard(number: &str, address: &str) -> String {
    authenticated(
        "Mon compte",
        &format!(
            r#"<div class="dashboard"><div class="dashboard__contract" data-contract-number="{number}">
  <p class="dashboard__address">{address}</p>
  <p class="dashboard__client-ref">5550001</p>
</div></div>"#
        ),
    )
}

pub struct Row<'a> {
    pub kind: &'a str,
    pub reference: Option<&'a str>,
    pub date: &'a str,
    pub amount: Option<&'a str>,
    pub status: &'a str,
}

impl<'a> Row<'a> {
    pub fn invoice(reference: &'a str, date: &'a str, amount: &'a str, status: &'a str) -> Self {
        Self {
            kind: "invoice",
            reference: Some(reference),
            date,
            amount: Some(amount),
            status,
        }
    }

    pub fn schedule(date: &'a str, amount: Option<&'a str>, status: &'a str) -> Self {
        Self {
            kind: "schedule",
            reference: None,
            date,
            amount,
            status,
        }
    }
}

fn rows_html(rows: &[Row<'_>]) -> String {
    rows.iter()
        .map(|row| {
            let reference = row
                .reference
                .map(|r| format!(r#" data-ref="{r}""#))
                .unwrap_or_default();
            let amount = row
                .amount
                .map(|a| format!(r#"<span class="invoice-row__amount">{a}</span>"#))
                .unwrap_or_default();
            let download = row
                .reference
                .map(|r| format!(r#"<a class="invoice-row__download" href="/clients/documents/{r}.pdf">PDF</a>"#))
                .unwrap_or_default();
            format!(
                r#"<div class="invoice-row" data-kind="{}"{reference}>
  <span class="invoice-row__date">{}</span>{amount}
  <span class="invoice-row__status">{}</span>{download}
</div>"#,
                row.kind, row.date, row.status
            )
        })
        .collect()
}

pub fn bills_page(elec: &[Row<'_>], gas: &[Row<'_>]) -> String {
    authenticated(
        "Mes factures",
        &format!(
            r#"<section class="invoices">
<div class="invoices__section invoices__section--elec">{}</div>
<div class="invoices__section invoices__section--gas">{}</div>
</section>"#,
            rows_html(elec),
            rows_html(gas)
        ),
    )
}

pub fn contract_docs_page(docs: &[(&str, &str, &str)]) -> String {
    let items: String = docs
        .iter()
        .map(|(energy, start, href)| {
            format!(
                r#"<div class="contract-docs__item" data-energy="{energy}">
  <span class="contract-docs__start">{start}</span>
  <a class="contract-docs__download" href="{href}">Télécharger</a>
</div>"#
            )
        })
        .collect();
    authenticated(
        "Mon contrat",
        &format!(r#"<div class="contract-docs">{items}</div>"#),
    )
}

pub fn infos_page(email: &str) -> String {
    authenticated(
        "Mes infos",
        &format!(
            r#"<h1 class="personal-info__title">Mes informations</h1>
<p class="personal-info__name">Camille Martin</p>
<p class="personal-info__email">{email}</p>
<p class="personal-info__phone">06 12 34 56 78</p>
<p class="personal-info__address" data-contract-number="100200300">12 rue des Lilas 75011 Paris</p>"#
        ),
    )
}

/// Older site generation: no `#page-content`, `ec_fr_` classes everywhere.
pub fn legacy_page(title: &str, body: &str) -> String {
    format!(
        r#"<html><head><title>{title}</title></head><body>
<a class="header-account" href="/clients/mon-compte">Mon compte</a>
<div class="ec_fr_contenu">{body}</div></body></html>"#
    )
}

pub fn legacy_home(number: &str, address: &str) -> String {
    legacy_page(
        "Mon compte",
        &format!(
            r#"<div class="ec_fr_accueil"><div class="compte compte-actif" data-contract-number="{number}">
  <span class="compte__adresse">{address}</span>
  <span class="compte__reference">7770001</span>
</div></div>"#
        ),
    )
}

/// One history block: energy picto, download link and schedule entries as
/// `(amount, date, paid)`.
pub fn legacy_block(picto: &str, href: &str, entries: &[(&str, &str, bool)]) -> String {
    let rows: String = entries
        .iter()
        .enumerate()
        .map(|(i, (amount, date, paid))| {
            let image = if *paid {
                r#"<img src="/typo3conf/ext/de_facturation/Ressources/Images/ech_ok.png">"#
            } else {
                ""
            };
            format!(
                "<tr><td>{}</td><td>{amount}</td><td>{date}</td><td>{image}</td></tr>",
                i + 1
            )
        })
        .collect();
    format!(
        r##"<div class="row">
  <span class="picto__puce__{picto}"></span>
  <a href="#">Détails</a>
  <a href="{href}">Télécharger</a>
  <table><tbody>{rows}</tbody></table>
</div>"##
    )
}

pub fn legacy_bills_page(blocks: &[String]) -> String {
    legacy_page(
        "Ma facture",
        &format!(
            r#"<div class="ec_fr_historique_facture_echeancier__liste"><div>{}</div></div>"#,
            blocks.concat()
        ),
    )
}

pub fn legacy_infos_page(email: &str) -> String {
    legacy_page(
        "Mes infos",
        &format!(
            r#"<h1 class="ec_fr_mes_infos__titre">Mes informations</h1>
<p id="ec-infos-nom">Camille Martin</p>
<p id="ec-infos-email">{email}</p>"#
        ),
    )
}

#[derive(Debug, Clone)]
struct Transition {
    target: String,
    activate: Option<String>,
}

#[derive(Debug, Clone)]
struct Human {
    after_checks: usize,
    target: String,
    typed: Option<(String, String)>,
    done: bool,
}

#[derive(Debug, Clone)]
struct Rendering {
    reads_left: usize,
    full: String,
}

#[derive(Default)]
struct State {
    pages: HashMap<String, String>,
    /// Pages that show a partial version for their first reads after a load.
    partial: HashMap<String, (usize, String)>,
    rendering: Option<Rendering>,
    partial_reads: usize,
    contract_pages: HashMap<(String, String), String>,
    failures: HashMap<String, VecDeque<String>>,
    transitions: HashMap<String, Transition>,
    active_contract: Option<String>,
    current_url: String,
    current_html: String,
    inputs: HashMap<String, String>,
    human: Option<Human>,
    url_checks: usize,
    surfaced: usize,
    cookies: HashMap<String, String>,
    loads: Vec<String>,
    clicks: Vec<String>,
}

impl State {
    fn load(&mut self, url: &str) {
        let failure = self.failures.get_mut(url).and_then(VecDeque::pop_front);
        let html = if let Some(failure) = failure {
            failure
        } else if let Some(html) = self
            .active_contract
            .as_ref()
            .and_then(|c| self.contract_pages.get(&(c.clone(), url.to_string())))
        {
            html.clone()
        } else if let Some(html) = self.pages.get(url) {
            html.clone()
        } else {
            "<html><head><title>404 Not Found</title></head><body><h1>Not Found</h1></body></html>"
                .to_string()
        };
        self.current_url = url.to_string();
        self.inputs.clear();
        self.loads.push(url.to_string());
        match self.partial.get(url).cloned() {
            Some((reads, partial)) => {
                self.rendering = Some(Rendering {
                    reads_left: reads,
                    full: html,
                });
                self.current_html = partial;
            }
            None => {
                self.rendering = None;
                self.current_html = html;
            }
        }
    }

    /// Read the page as it is rendered right now.
    fn read(&mut self) -> String {
        if let Some(rendering) = self.rendering.as_mut() {
            if rendering.reads_left == 0 {
                self.current_html = std::mem::take(&mut rendering.full);
                self.rendering = None;
            } else {
                rendering.reads_left -= 1;
                self.partial_reads += 1;
            }
        }
        self.current_html.clone()
    }

    fn is_present(&self, selector: &str) -> Result<bool> {
        let Ok(parsed) = Selector::parse(selector) else {
            bail!("invalid selector {selector}");
        };
        let doc = Html::parse_document(&self.current_html);
        let present = doc.select(&parsed).next().is_some();
        Ok(present)
    }
}

/// Scripted portal: pages keyed by URL, clicks mapped to navigations.
#[derive(Default)]
pub struct FakePortal {
    state: Mutex<State>,
}

impl FakePortal {
    pub fn new() -> Self {
        let portal = Self::default();
        portal.with(|s| {
            s.current_url = "about:blank".to_string();
            s.current_html = "<html><body></body></html>".to_string();
        });
        portal
    }

    fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn page(self, path: &str, html: impl Into<String>) -> Self {
        self.with(|s| s.pages.insert(url(path), html.into()));
        self
    }

    /// Page served at `path` while `contract` is the active one.
    pub fn contract_page(self, contract: &str, path: &str, html: impl Into<String>) -> Self {
        self.with(|s| {
            s.contract_pages
                .insert((contract.to_string(), url(path)), html.into())
        });
        self
    }

    pub fn active(self, contract: &str) -> Self {
        self.with(|s| s.active_contract = Some(contract.to_string()));
        self
    }

    pub fn on_click(self, selector: &str, path: &str) -> Self {
        self.with(|s| {
            s.transitions.insert(
                selector.to_string(),
                Transition {
                    target: url(path),
                    activate: None,
                },
            )
        });
        self
    }

    /// The switch control of `contract` makes it active and lands on `path`.
    pub fn on_switch(self, contract: &str, path: &str) -> Self {
        let selector = format!(
            ".contract-selection__switch[data-contract-number=\"{contract}\"]"
        );
        self.with(|s| {
            s.transitions.insert(
                selector,
                Transition {
                    target: url(path),
                    activate: Some(contract.to_string()),
                },
            )
        });
        self
    }

    /// Every load of `path` shows `partial` for the first `reads` content
    /// reads, then the real page.
    pub fn renders_after(self, path: &str, reads: usize, partial: impl Into<String>) -> Self {
        self.with(|s| s.partial.insert(url(path), (reads, partial.into())));
        self
    }

    /// Serve `html` instead of the real page on the next load of `path`.
    pub fn fail_next_load(self, path: &str, html: impl Into<String>) -> Self {
        self.with(|s| {
            s.failures
                .entry(url(path))
                .or_default()
                .push_back(html.into())
        });
        self
    }

    /// A human completes the login by hand after `after_checks` URL reads,
    /// optionally typing credentials into the form first.
    pub fn human_logs_in(self, after_checks: usize, path: &str, typed: Option<(&str, &str)>) -> Self {
        self.with(|s| {
            s.human = Some(Human {
                after_checks,
                target: url(path),
                typed: typed.map(|(l, p)| (l.to_string(), p.to_string())),
                done: false,
            })
        });
        self
    }

    pub fn cookie(self, name: &str, value: &str) -> Self {
        self.with(|s| s.cookies.insert(name.to_string(), value.to_string()));
        self
    }

    /// How many times `path` was loaded (navigations and reloads).
    pub fn loads_of(&self, path: &str) -> usize {
        let target = url(path);
        self.with(|s| s.loads.iter().filter(|u| **u == target).count())
    }

    pub fn clicks(&self) -> Vec<String> {
        self.with(|s| s.clicks.clone())
    }

    /// Content reads that saw a page still rendering.
    pub fn partial_reads(&self) -> usize {
        self.with(|s| s.partial_reads)
    }

    pub fn surfaced(&self) -> usize {
        self.with(|s| s.surfaced)
    }

    pub fn input(&self, selector: &str) -> Option<String> {
        self.with(|s| s.inputs.get(selector).cloned())
    }
}

#[async_trait]
impl PageDriver for FakePortal {
    async fn goto(&self, url: &str) -> Result<()> {
        self.with(|s| s.load(url));
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.with(|s| {
            let current = s.current_url.clone();
            s.load(&current);
        });
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.with(|s| {
            s.url_checks += 1;
            let checks = s.url_checks;
            if let Some(human) = s.human.as_mut().filter(|h| !h.done && checks >= h.after_checks) {
                human.done = true;
                let target = human.target.clone();
                s.load(&target);
            }
            s.current_url.clone()
        }))
    }

    async fn content(&self) -> Result<String> {
        Ok(self.with(State::read))
    }

    async fn is_element_present(&self, selector: &str) -> Result<bool> {
        self.with(|s| s.is_present(selector))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.with(|s| {
            if !s.is_present(selector)? {
                bail!("nothing to click at {selector}");
            }
            s.clicks.push(selector.to_string());
            let Some(transition) = s.transitions.get(selector).cloned() else {
                bail!("no transition for {selector}");
            };
            if let Some(contract) = transition.activate {
                s.active_contract = Some(contract);
            }
            s.load(&transition.target);
            Ok(())
        })
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        if script.contains("innerHTML = ''") {
            self.with(|s| {
                s.rendering = None;
                s.current_html = "<html><head></head><body></body></html>".to_string();
            });
            return Ok(serde_json::Value::Bool(true));
        }
        Ok(serde_json::Value::Null)
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.with(|s| {
            if !s.is_present(selector)? {
                bail!("no input at {selector}");
            }
            s.inputs.insert(selector.to_string(), value.to_string());
            Ok(())
        })
    }

    async fn input_value(&self, selector: &str) -> Result<Option<String>> {
        Ok(self.with(|s| s.inputs.get(selector).cloned()))
    }

    async fn surface(&self) -> Result<()> {
        self.with(|s| {
            s.surfaced += 1;
            if let Some((login, password)) = s.human.as_ref().and_then(|h| h.typed.clone()) {
                s.inputs.insert(
                    "form.login-form input[name=\"login\"]".to_string(),
                    login,
                );
                s.inputs.insert(
                    "form.login-form input[name=\"password\"]".to_string(),
                    password,
                );
            }
        });
        Ok(())
    }

    async fn cookies(&self) -> Result<HashMap<String, String>> {
        Ok(self.with(|s| s.cookies.clone()))
    }
}

pub const FIRST: &str = "100200300";
pub const FIRST_ADDRESS: &str = "12 rue des Lilas 75011 Paris";

/// Login page plus one active contract with two invoices, one unpriced
/// schedule entry and one contract document.
pub fn single_contract_portal() -> FakePortal {
    FakePortal::new()
        .page(LOGIN, login_page())
        .page(
            WELCOME,
            listing(&[ListedContract {
                number: FIRST,
                address: FIRST_ADDRESS,
                active: true,
            }]),
        )
        .page(
            BILLS,
            bills_page(
                &[
                    Row::invoice("F1", "12/01/2024", "45,30 €", "Payée le 15/01/2024"),
                    Row::invoice("F2", "12/02/2024", "51,10 €", "À payer"),
                ],
                &[Row::schedule("05/03/2024", None, "")],
            ),
        )
        .page(
            CONTRACT_DOCS,
            contract_docs_page(&[("elec", "01/09/2023", "/clients/documents/contrat-elec.pdf")]),
        )
        .page(INFOS, infos_page("camille@example.com"))
        .on_click(INFOS_LINK, INFOS)
        .active(FIRST)
}

pub const SECOND: &str = "100200301";
pub const SECOND_ADDRESS: &str = "3 impasse du Moulin 69003 Lyon";

pub fn both_contracts() -> [ListedContract<'static>; 2] {
    [
        ListedContract {
            number: FIRST,
            address: FIRST_ADDRESS,
            active: true,
        },
        ListedContract {
            number: SECOND,
            address: SECOND_ADDRESS,
            active: false,
        },
    ]
}

/// Two contracts listed after login; switching to the second lands on its
/// dashboard.
pub fn two_contract_portal() -> FakePortal {
    let contracts = both_contracts();

    single_contract_portal()
        .on_click(SUBMIT, WELCOME)
        .page(WELCOME, listing(&contracts))
        .page(CONTRACTS, listing(&contracts))
        .contract_page(
            FIRST,
            BILLS,
            bills_page(
                &[
                    Row::invoice("F1", "12/01/2024", "45,30 €", "Payée le 15/01/2024"),
                    Row::invoice("F2", "12/02/2024", "51,10 €", "À payer"),
                ],
                &[
                    Row::invoice("G1", "05/03/2024", "38,00 €", "À payer"),
                    Row::schedule("05/04/2024", None, ""),
                ],
            ),
        )
        .contract_page(
            SECOND,
            BILLS,
            bills_page(
                &[
                    Row::invoice("F10", "20/01/2024", "1 234,56 €", "Payée le 25/01/2024"),
                    Row::invoice("F11", "20/02/2024", "99,00 €", "En attente de paiement"),
                ],
                &[],
            ),
        )
        .contract_page(SECOND, HOME, dashboard(SECOND, SECOND_ADDRESS))
        .on_switch(SECOND, HOME)
}

pub fn sub_path(number: &str, address: &str, category: &str) -> String {
    format!("{number} - {address}/{category}")
}
