use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rocket::form::Form;
use rocket::response::Redirect;
use rocket::serde::json::Json;
use rocket::{get, post, routes, Route, State};
use rocket_dyn_templates::{context, Template};
use serde::Serialize;
use tracing::{error, info, warn};
use url::form_urlencoded;

use crate::auth::{Credentials, CurrentSession};
use crate::dashboard::{DashboardView, KpiCard, ReportDashboard};
use crate::error::{AppError, Result};
use crate::filters::{Dimension, FilterForm, FilterState, GroupKey, ALL, NO_AGGREGATION};
use crate::forms::{ContactForm, CreateReportForm, FieldErrors, LANGUAGES, MODELS};
use crate::models::{sort_newest_first, LlmResponseRecord, Report, ReportSummary, Session};
use crate::state::Services;

/// Responses an HTML route can produce
#[derive(Responder)]
pub enum Page {
    Html(Template),
    Redirect(Redirect),
    #[response(status = 400)]
    BadRequest(String),
    Failed(AppError),
}

fn sign_in() -> Page {
    Page::Redirect(Redirect::to("/auth/login"))
}

// =====================
// Marketing Pages
// =====================

#[get("/")]
pub fn index(session: CurrentSession) -> Template {
    Template::render("index", context! {
        title: "Generative Engine Optimization",
        session: session.get(),
    })
}

#[get("/pricing")]
pub fn pricing(session: CurrentSession) -> Template {
    Template::render("pricing", context! {
        title: "Pricing",
        session: session.get(),
    })
}

#[get("/terms")]
pub fn terms(session: CurrentSession) -> Template {
    Template::render("terms", context! {
        title: "Terms of Service",
        session: session.get(),
    })
}

#[get("/privacy")]
pub fn privacy(session: CurrentSession) -> Template {
    Template::render("privacy", context! {
        title: "Privacy Policy",
        session: session.get(),
    })
}

#[get("/example-report")]
pub fn example_report(session: CurrentSession) -> Template {
    Template::render("example_report", context! {
        title: "Example Report",
        session: session.get(),
    })
}

fn contact_template(session: Option<&Session>, form: &ContactForm, errors: &FieldErrors, submitted: bool) -> Template {
    Template::render("contact", context! {
        title: "Contact",
        session: session,
        form: form,
        errors: errors,
        submitted: submitted,
    })
}

#[get("/contact")]
pub fn contact_page(session: CurrentSession) -> Template {
    contact_template(session.get(), &ContactForm::default(), &FieldErrors::new(), false)
}

#[post("/contact", data = "<form>")]
pub fn contact_submit(session: CurrentSession, form: Form<ContactForm>) -> Template {
    let form = form.into_inner();
    match form.validated() {
        Ok(message) => {
            info!(
                name = %message.name,
                email = %message.email,
                subject = %message.subject,
                "Contact message received"
            );
            contact_template(session.get(), &ContactForm::default(), &FieldErrors::new(), true)
        }
        Err(errors) => contact_template(session.get(), &form, &errors, false),
    }
}

// =====================
// Auth & Account
// =====================

#[get("/auth/login")]
pub fn login(services: &State<Services>) -> Redirect {
    Redirect::to(services.auth.login())
}

#[get("/auth/register")]
pub fn register(services: &State<Services>) -> Redirect {
    Redirect::to(services.auth.register())
}

#[get("/auth/forgot-password")]
pub fn forgot_password(services: &State<Services>) -> Redirect {
    Redirect::to(services.auth.recovery())
}

#[get("/auth/logout")]
pub async fn logout(services: &State<Services>, creds: Credentials) -> Redirect {
    match services.auth.logout(&creds).await {
        Ok(url) => Redirect::to(url),
        Err(err) => {
            error!(error = %err, "Logout failed");
            Redirect::to("/")
        }
    }
}

#[get("/account")]
pub fn account(services: &State<Services>, session: CurrentSession) -> Page {
    let Some(session) = session.get() else {
        return sign_in();
    };
    Page::Html(Template::render("account", context! {
        title: "My Account",
        display_name: session.display_name(),
        session: session,
        settings_url: services.auth.settings(),
    }))
}

#[get("/account/settings")]
pub fn account_settings(services: &State<Services>) -> Redirect {
    Redirect::to(services.auth.settings())
}

// =====================
// Reports
// =====================

async fn report_summaries(services: &Services, creds: &Credentials) -> Vec<ReportSummary> {
    let mut reports = services.api.list_reports(creds).await.unwrap_or_else(|err| {
        error!(error = %err, "Failed to list reports");
        Vec::new()
    });
    sort_newest_first(&mut reports);
    reports.iter().map(ReportSummary::from).collect()
}

#[get("/dashboard")]
pub async fn dashboard_home(services: &State<Services>, session: CurrentSession, creds: Credentials) -> Page {
    let Some(session) = session.get() else {
        return sign_in();
    };
    let reports = report_summaries(services, &creds).await;
    let recent: Vec<&ReportSummary> = reports.iter().take(5).collect();
    Page::Html(Template::render("dashboard", context! {
        title: "Dashboard",
        display_name: session.display_name(),
        session: session,
        report_count: reports.len(),
        recent: recent,
    }))
}

#[get("/reports")]
pub async fn reports_page(services: &State<Services>, session: CurrentSession, creds: Credentials) -> Page {
    let Some(session) = session.get() else {
        return sign_in();
    };
    let reports = report_summaries(services, &creds).await;
    Page::Html(Template::render("reports", context! {
        title: "Reports",
        session: session,
        reports: reports,
    }))
}

#[derive(Debug, Serialize)]
struct CreateOutcome {
    ok: bool,
    report_id: Option<i64>,
    message: Option<String>,
}

fn create_template(
    session: &Session,
    form: &CreateReportForm,
    errors: &FieldErrors,
    outcome: Option<CreateOutcome>,
) -> Template {
    Template::render("report_create", context! {
        title: "Create a report",
        session: session,
        form: form,
        errors: errors,
        outcome: outcome,
        languages: LANGUAGES,
        models: MODELS,
    })
}

#[get("/reports/create")]
pub fn create_report_page(session: CurrentSession) -> Page {
    let Some(session) = session.get() else {
        return sign_in();
    };
    Page::Html(create_template(session, &CreateReportForm::default(), &FieldErrors::new(), None))
}

#[post("/reports/create", data = "<form>")]
pub async fn create_report_submit(
    services: &State<Services>,
    session: CurrentSession,
    creds: Credentials,
    form: Form<CreateReportForm>,
) -> Page {
    let Some(session) = session.get() else {
        return sign_in();
    };
    let mut form = form.into_inner();

    let request = match form.validated() {
        Ok(request) => request,
        Err(errors) => return Page::Html(create_template(session, &form, &errors, None)),
    };

    let outcome = match services.api.analyze(&creds, &request).await {
        Ok(report_id) => {
            info!(report_id, brand = %request.brand_name, "Report generation started");
            form.reset_brand();
            CreateOutcome {
                ok: true,
                report_id: Some(report_id),
                message: None,
            }
        }
        Err(err) => {
            error!(error = %err, brand = %request.brand_name, "Analyze request failed");
            let message = err.upstream_body().map(str::to_string).unwrap_or_else(|| err.to_string());
            CreateOutcome {
                ok: false,
                report_id: None,
                message: Some(message),
            }
        }
    };
    Page::Html(create_template(session, &form, &FieldErrors::new(), Some(outcome)))
}

#[post("/reports/<id>/delete")]
pub async fn delete_report(services: &State<Services>, session: CurrentSession, creds: Credentials, id: i64) -> Page {
    if session.get().is_none() {
        return sign_in();
    }
    match services.api.delete_report(&creds, id).await {
        Ok(()) => {
            info!(report_id = id, "Report deleted");
            Page::Redirect(Redirect::to("/reports"))
        }
        Err(err) => Page::Failed(err),
    }
}

// =====================
// Report Dashboard
// =====================

#[derive(Debug, Serialize)]
struct FilterSelect {
    param: &'static str,
    label: &'static str,
    options: Vec<String>,
    selected: String,
}

#[derive(Debug, Serialize)]
struct AggregateOption {
    value: &'static str,
    label: &'static str,
    selected: bool,
}

#[derive(Debug, Serialize)]
struct Panel {
    key: String,
    open: bool,
    href: String,
    responses: Vec<LlmResponseRecord>,
}

#[derive(Debug, Serialize)]
struct CardView {
    card: KpiCard,
    panel: Option<Panel>,
}

fn filter_selects(report: &Report, filters: &FilterState) -> Vec<FilterSelect> {
    Dimension::ALL
        .iter()
        .map(|d| FilterSelect {
            param: d.param(),
            label: d.label(),
            options: d.options(report).to_vec(),
            selected: filters.constraint(*d).unwrap_or(ALL).to_string(),
        })
        .collect()
}

fn aggregate_options(filters: &FilterState) -> Vec<AggregateOption> {
    let mut options = vec![AggregateOption {
        value: NO_AGGREGATION,
        label: "None",
        selected: filters.aggregate_by.is_none(),
    }];
    options.extend(Dimension::ALL.iter().map(|d| AggregateOption {
        value: d.param(),
        label: d.label(),
        selected: filters.aggregate_by == Some(*d),
    }));
    options
}

/// Dashboard URL with `key` toggled in the set of open panels.
fn panel_href(report_id: i64, filters: &FilterState, open: &BTreeSet<String>, key: &str) -> String {
    let mut toggled = open.clone();
    if !toggled.remove(key) {
        toggled.insert(key.to_string());
    }
    let mut query = form_urlencoded::Serializer::new(filters.page_query());
    for key in &toggled {
        query.append_pair("open", key);
    }
    format!("/reports/{}?{}", report_id, query.finish())
}

/// Fetch (or reuse) the responses of every requested panel. A panel whose
/// fetch fails is left out, so it renders closed.
async fn load_panels(
    services: &Services,
    creds: &Credentials,
    report_id: i64,
    filters: &FilterState,
    requested: &BTreeSet<String>,
) -> BTreeMap<String, Arc<Vec<LlmResponseRecord>>> {
    let mut loaded = BTreeMap::new();
    for key in requested {
        let group = GroupKey::parse(key, filters.aggregate_by);
        match services
            .responses
            .load(services.api.as_ref(), creds, report_id, filters, &group)
            .await
        {
            Ok(records) => {
                loaded.insert(key.clone(), records);
            }
            Err(err) => {
                warn!(error = %err, report_id, group = key.as_str(), "Could not load responses, keeping panel closed");
            }
        }
    }
    loaded
}

fn card_views(
    view: &DashboardView,
    filters: &FilterState,
    open: &BTreeSet<String>,
    loaded: &BTreeMap<String, Arc<Vec<LlmResponseRecord>>>,
) -> (CardView, Vec<CardView>) {
    let panel = |key: &str| Panel {
        key: key.to_string(),
        open: loaded.contains_key(key),
        href: panel_href(view.report_id, filters, open, key),
        responses: loaded
            .get(key)
            .map(|records| records.as_ref().clone())
            .unwrap_or_default(),
    };

    let grouped = view.aggregated_by.is_some();
    let overall = CardView {
        card: view.overall.clone(),
        panel: (!grouped).then(|| panel(GroupKey::MAIN)),
    };
    let groups = view
        .groups
        .iter()
        .map(|card| CardView {
            card: card.clone(),
            panel: Some(panel(&card.key)),
        })
        .collect();
    (overall, groups)
}

/// Keys of the response panels a view can open.
fn panel_keys(view: &DashboardView) -> BTreeSet<&str> {
    if view.aggregated_by.is_some() {
        view.groups.iter().map(|card| card.key.as_str()).collect()
    } else {
        BTreeSet::from([GroupKey::MAIN])
    }
}

fn loading_page(session: &Session, report_id: i64) -> Page {
    Page::Html(Template::render("report_loading", context! {
        title: "Loading report",
        session: session,
        report_id: report_id,
    }))
}

#[get("/reports/<id>?<open>&<filters..>")]
pub async fn report_page(
    services: &State<Services>,
    session: CurrentSession,
    creds: Credentials,
    id: i64,
    open: Vec<String>,
    filters: FilterForm,
) -> Page {
    let Some(session) = session.get() else {
        return sign_in();
    };
    let filters = match filters.into_state() {
        Ok(filters) => filters,
        Err(err) => return Page::BadRequest(err.to_string()),
    };

    let dashboard = match ReportDashboard::open(services.api.as_ref(), &creds, id).await {
        Ok(dashboard) => dashboard,
        Err(err) => {
            error!(error = %err, report_id = id, "Failed to load report");
            return loading_page(session, id);
        }
    };
    if let Err(err) = dashboard.apply_filters(services.api.as_ref(), &creds, &filters).await {
        error!(error = %err, report_id = id, "Failed to load KPIs");
        return loading_page(session, id);
    }
    let Some(view) = dashboard.view() else {
        return loading_page(session, id);
    };

    let valid_keys = panel_keys(&view);
    let requested: BTreeSet<String> = open
        .into_iter()
        .filter(|key| valid_keys.contains(key.as_str()))
        .collect();

    let loaded = load_panels(services, &creds, id, &filters, &requested).await;
    let open: BTreeSet<String> = loaded.keys().cloned().collect();
    let (overall, groups) = card_views(&view, &filters, &open, &loaded);

    Page::Html(Template::render("report", context! {
        title: format!("{} Intelligence", view.brand_name),
        session: session,
        report: dashboard.report(),
        selects: filter_selects(dashboard.report(), &filters),
        aggregate_options: aggregate_options(&filters),
        aggregated_by: view.aggregated_by.map(Dimension::label),
        overall: overall,
        groups: groups,
        pie: &view.pie,
        competitors: &view.competitors,
    }))
}

// =====================
// JSON API Routes
// =====================

#[get("/session")]
pub fn api_session(session: CurrentSession) -> Json<Option<Session>> {
    Json(session.0)
}

/// Report and KPIs for `filters`, fetched with the visitor's credentials.
async fn dashboard_view(
    services: &Services,
    creds: &Credentials,
    id: i64,
    filters: &FilterState,
) -> Result<DashboardView> {
    let dashboard = ReportDashboard::open(services.api.as_ref(), creds, id).await?;
    dashboard.apply_filters(services.api.as_ref(), creds, filters).await?;
    dashboard
        .view()
        .ok_or_else(|| AppError::Unexpected("KPI response superseded".to_string()))
}

#[get("/reports/<id>/dashboard?<filters..>")]
pub async fn api_dashboard(
    services: &State<Services>,
    session: CurrentSession,
    creds: Credentials,
    id: i64,
    filters: FilterForm,
) -> Result<Json<DashboardView>> {
    if session.get().is_none() {
        return Err(AppError::Unauthenticated);
    }
    let filters = filters.into_state()?;
    dashboard_view(services, &creds, id, &filters).await.map(Json)
}

#[get("/reports/<id>/responses?<group>&<filters..>")]
pub async fn api_responses(
    services: &State<Services>,
    session: CurrentSession,
    creds: Credentials,
    id: i64,
    group: Option<String>,
    filters: FilterForm,
) -> Result<Json<Vec<LlmResponseRecord>>> {
    if session.get().is_none() {
        return Err(AppError::Unauthenticated);
    }
    let filters = filters.into_state()?;

    // A cached panel is only served once the backend accepts these
    // credentials for the report.
    let view = dashboard_view(services, &creds, id, &filters).await?;
    let key = group.unwrap_or_else(|| GroupKey::MAIN.to_string());
    if !panel_keys(&view).contains(key.as_str()) {
        return Err(AppError::InvalidFilter(format!("unknown group `{key}`")));
    }

    let group = GroupKey::parse(&key, filters.aggregate_by);
    let records = services
        .responses
        .load(services.api.as_ref(), &creds, id, &filters, &group)
        .await?;
    Ok(Json(records.as_ref().clone()))
}

// =====================
// Route Collections
// =====================

pub fn index_routes() -> Vec<Route> {
    routes![
        index,
        pricing,
        terms,
        privacy,
        example_report,
        contact_page,
        contact_submit,
        login,
        register,
        forgot_password,
        logout,
        account,
        account_settings,
        dashboard_home,
        reports_page,
        create_report_page,
        create_report_submit,
        delete_report,
        report_page,
    ]
}

pub fn api_routes() -> Vec<Route> {
    routes![
        api_session,
        api_dashboard,
        api_responses,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_links_toggle_their_own_key() {
        let filters = FilterState::default().with(Dimension::Region, "France");
        let open = BTreeSet::from(["music".to_string()]);

        assert_eq!(
            panel_href(7, &filters, &open, "music"),
            "/reports/7?region=France&aggregate_by=keyword"
        );
        assert_eq!(
            panel_href(7, &filters, &open, "sound"),
            "/reports/7?region=France&aggregate_by=keyword&open=music&open=sound"
        );
    }

    #[test]
    fn aggregate_options_mark_current_choice() {
        let options = aggregate_options(&FilterState::ungrouped());
        assert_eq!(options.len(), 6);
        assert!(options[0].selected);
        assert!(options.iter().skip(1).all(|o| !o.selected));
    }
}
