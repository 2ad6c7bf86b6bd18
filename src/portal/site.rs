//! Pages and markers shared by every site generation: login, landing and
//! error/recovery pages.

use reqwest::Url;

pub const LOGIN_PATH: &str = "/clients/connexion";

/// Where an already-active session lands.
pub const HOME_PATH: &str = "/clients/mon-compte";

/// Where a freshly established session lands.
pub const WELCOME_PATH: &str = "/clients/mon-compte/bienvenue";

pub const LOGIN_FORM: &str = "form.login-form";
pub const LOGIN_INPUT: &str = "form.login-form input[name=\"login\"]";
pub const PASSWORD_INPUT: &str = "form.login-form input[name=\"password\"]";
pub const LOGIN_SUBMIT: &str = "form.login-form button[type=\"submit\"]";
pub const LOGIN_ERROR: &str = ".formlabel-left.error";
pub const CAPTCHA: &str = ".g-recaptcha, #captcha, iframe[src*=\"captcha\"]";

/// Account-management link in the header of every authenticated page.
pub const ACCOUNT_LINK: &str = "a.header-account";

/// Contract-selection listing, in either site generation.
pub const CONTRACT_SELECTION: &str = ".contract-selection, .ec_fr_liste_comptes";

/// Present on pages of the older site generation only.
pub const LEGACY_MARKER: &str = "[class*=\"ec_fr_\"]";

pub const CONTENT_MARKER: &str = "#page-content";
pub const ALT_CONTENT_MARKER: &str = ".ec_fr_contenu";
pub const GO_BACK_LINK: &str = "a.error-page__back";
pub const NOT_FOUND_IMAGE: &str = "img[src*=\"404\"]";

/// Where an authenticated session was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landing {
    /// Home page of a session that was already active at start.
    ActiveSession,
    /// Post-login landing page of a session just established.
    FreshLogin,
    /// Contract-selection listing.
    ContractSelection,
}

fn normalized_path(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let path = parsed.path().trim_end_matches('/');
    Some(if path.is_empty() { "/".to_string() } else { path.to_string() })
}

/// Decide whether the current page proves an authenticated session.
///
/// The account link only counts on one of the two landing URLs; the
/// contract-selection listing counts wherever it is.
pub fn classify_landing(url: &str, account_link: bool, contract_selection: bool) -> Option<Landing> {
    if contract_selection {
        return Some(Landing::ContractSelection);
    }
    if !account_link {
        return None;
    }
    match normalized_path(url)?.as_str() {
        HOME_PATH => Some(Landing::ActiveSession),
        WELCOME_PATH => Some(Landing::FreshLogin),
        _ => None,
    }
}

/// Join a site path onto the portal root.
pub fn page_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}
