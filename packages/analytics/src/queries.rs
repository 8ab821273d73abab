//! Fixed analytic queries behind the agent's named tools.
//!
//! Each operation has a `*_statement` builder that binds the caller's
//! arguments as `$n` parameters and an async function that runs it. The
//! builders are pure so the statement shape can be checked without a store.

use moosicbox_json_utils::database::ToValue as _;
use support_desk_analytics_models::{
    AtRiskParams, CustomerInfoParams, CustomerRef, DEFAULT_MIN_MRR, HealthScoreParams,
    HealthScoreResult, OpenTicketsParams, RecordRow, TicketMetrics, TicketPriority, TicketStatus,
};
use switchy_database::DatabaseValue;

use crate::InsightsError;
use crate::executor::QueryExecutor;
use crate::health;
use crate::validator::ReadOnlyStatement;

/// Longest search term echoed into error summaries.
const MAX_SUMMARY_CHARS: usize = 64;

/// Renders a fixed status set as a SQL list literal, e.g. `'Open', 'In Progress'`.
fn status_list(statuses: &[TicketStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `CASE` expression ranking `t.priority` most severe first.
fn priority_rank_expr() -> String {
    let arms: String = TicketPriority::all()
        .iter()
        .map(|p| format!(" WHEN '{p}' THEN {}", p.severity_rank()))
        .collect();
    format!("CASE t.priority::text{arms} ELSE {} END", TicketPriority::all().len())
}

/// Builds a `%term%` pattern for `ILIKE`, escaping the term's own wildcards.
fn contains_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn summarize(field: &str, value: &str) -> String {
    let clipped: String = value.chars().take(MAX_SUMMARY_CHARS).collect();
    if clipped.len() < value.len() {
        format!("{field}=\"{clipped}...\"")
    } else {
        format!("{field}=\"{clipped}\"")
    }
}

fn required_text<'a>(field: &'static str, value: &'a str) -> Result<&'a str, InsightsError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(InsightsError::InvalidArgument {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(trimmed)
}

/// Parses an optional priority filter.
///
/// # Errors
///
/// Returns [`InsightsError::InvalidArgument`] if the value is not `High`,
/// `Medium` or `Low` (any case).
pub fn parse_priority(priority: Option<&str>) -> Result<Option<TicketPriority>, InsightsError> {
    priority
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<TicketPriority>()
                .map_err(|_| InsightsError::InvalidArgument {
                    field: "priority",
                    reason: format!("'{p}' is not one of High, Medium, Low"),
                })
        })
        .transpose()
}

/// Resolves the revenue threshold, applying the default.
///
/// # Errors
///
/// Returns [`InsightsError::InvalidArgument`] if the threshold is negative
/// or not a finite number.
pub fn resolve_min_mrr(min_mrr: Option<f64>) -> Result<f64, InsightsError> {
    let min_mrr = min_mrr.unwrap_or(DEFAULT_MIN_MRR);
    if !min_mrr.is_finite() || min_mrr < 0.0 {
        return Err(InsightsError::InvalidArgument {
            field: "minMrr",
            reason: format!("must be a non-negative amount, got {min_mrr}"),
        });
    }
    Ok(min_mrr)
}

/// Builds the customer lookup statement.
///
/// # Errors
///
/// Returns [`InsightsError::InvalidArgument`] if `search` is blank.
pub fn customer_info_statement(search: &str) -> Result<ReadOnlyStatement, InsightsError> {
    let search = required_text("search", search)?;
    let unresolved = status_list(&TicketStatus::UNRESOLVED);

    let sql = format!(
        "SELECT c.id, c.name, c.email, c.country,
                c.subscription_tier::text AS subscription_tier,
                c.mrr::float8 AS mrr,
                c.created_at::timestamp AS created_at,
                COUNT(t.id) AS total_tickets,
                COUNT(t.id) FILTER (WHERE t.status::text IN ({unresolved})) AS open_tickets,
                COUNT(t.id) FILTER (WHERE t.status::text = '{in_progress}') AS in_progress_tickets,
                COUNT(t.id) FILTER (WHERE t.priority::text = '{high}') AS high_priority_tickets,
                MAX(t.created_at)::timestamp AS last_ticket_date
         FROM customers c
         LEFT JOIN support_tickets t ON t.customer_id = c.id
         WHERE c.name ILIKE $1 OR c.email ILIKE $1
         GROUP BY c.id
         ORDER BY c.mrr DESC, c.id",
        in_progress = TicketStatus::InProgress,
        high = TicketPriority::High,
    );

    Ok(ReadOnlyStatement::fixed(
        "get_customer_info",
        sql,
        vec![DatabaseValue::String(contains_pattern(search))],
        summarize("search", search),
    ))
}

/// Finds customers whose name or email contains the search term, with
/// their support ticket aggregates.
///
/// An empty result means nothing matched; it is not an error.
///
/// # Errors
///
/// Returns [`InsightsError`] if the search term is blank or the query fails.
pub async fn customer_info(
    executor: &QueryExecutor,
    params: &CustomerInfoParams,
) -> Result<Vec<RecordRow>, InsightsError> {
    let stmt = customer_info_statement(&params.search)?;
    let rows = executor.execute(&stmt).await?;

    if rows.is_empty() {
        log::warn!("No customer found for {}", stmt.summary());
    } else {
        log::info!("Found {} customer(s) for {}", rows.len(), stmt.summary());
    }

    Ok(rows)
}

/// Builds the unresolved tickets statement.
///
/// # Errors
///
/// Returns [`InsightsError::InvalidArgument`] for an unrecognized priority.
pub fn open_tickets_statement(priority: Option<&str>) -> Result<ReadOnlyStatement, InsightsError> {
    let priority = parse_priority(priority)?;
    let unresolved = status_list(&TicketStatus::UNRESOLVED);

    let mut db_params = Vec::new();
    let priority_filter = priority.map_or_else(String::new, |p| {
        db_params.push(DatabaseValue::String(p.to_string()));
        " AND t.priority::text = $1".to_string()
    });

    let sql = format!(
        "SELECT t.id, t.subject,
                t.status::text AS status,
                t.priority::text AS priority,
                t.created_at::timestamp AS created_at,
                c.name AS customer_name,
                c.subscription_tier::text AS subscription_tier,
                c.mrr::float8 AS mrr,
                c.country,
                (CURRENT_DATE - t.created_at::date)::bigint AS days_open
         FROM support_tickets t
         JOIN customers c ON c.id = t.customer_id
         WHERE t.status::text IN ({unresolved}){priority_filter}
         ORDER BY {rank}, days_open DESC, t.id",
        rank = priority_rank_expr(),
    );

    let summary =
        priority.map_or_else(|| "all priorities".to_string(), |p| format!("priority={p}"));

    Ok(ReadOnlyStatement::fixed(
        "get_open_tickets",
        sql,
        db_params,
        summary,
    ))
}

/// Lists Open and In Progress tickets with customer context, High before
/// Medium before Low, then longest open first.
///
/// # Errors
///
/// Returns [`InsightsError`] for an unrecognized priority or if the query
/// fails.
pub async fn open_tickets(
    executor: &QueryExecutor,
    params: &OpenTicketsParams,
) -> Result<Vec<RecordRow>, InsightsError> {
    let stmt = open_tickets_statement(params.priority.as_deref())?;
    let rows = executor.execute(&stmt).await?;
    log::info!("Found {} open ticket(s) ({})", rows.len(), stmt.summary());
    Ok(rows)
}

/// Builds the churn-risk statement.
///
/// # Errors
///
/// Returns [`InsightsError::InvalidArgument`] for a negative or non-finite
/// threshold.
pub fn at_risk_statement(min_mrr: Option<f64>) -> Result<ReadOnlyStatement, InsightsError> {
    let min_mrr = resolve_min_mrr(min_mrr)?;
    let unresolved = status_list(&TicketStatus::UNRESOLVED);

    // Compare as float8 so the bound parameter's binary encoding matches.
    let sql = format!(
        "SELECT c.id, c.name, c.email, c.country,
                c.subscription_tier::text AS subscription_tier,
                c.mrr::float8 AS mrr,
                COUNT(t.id) AS open_ticket_count,
                COUNT(t.id) FILTER (WHERE t.priority::text = '{high}') AS high_priority_count,
                STRING_AGG(t.subject, ' | ' ORDER BY t.created_at) AS ticket_subjects,
                MAX(t.created_at)::timestamp AS newest_ticket_date,
                MAX(CURRENT_DATE - t.created_at::date)::bigint AS oldest_ticket_age_days
         FROM customers c
         JOIN support_tickets t ON t.customer_id = c.id
         WHERE t.status::text IN ({unresolved})
           AND c.mrr::float8 >= $1
         GROUP BY c.id, c.name, c.email, c.country, c.subscription_tier, c.mrr
         ORDER BY c.mrr DESC, c.id",
        high = TicketPriority::High,
    );

    Ok(ReadOnlyStatement::fixed(
        "get_at_risk_customers",
        sql,
        vec![DatabaseValue::Real64(min_mrr)],
        format!("minMrr={min_mrr}"),
    ))
}

/// Finds customers at or above the revenue threshold that have at least
/// one unresolved ticket, highest revenue first.
///
/// # Errors
///
/// Returns [`InsightsError`] for an invalid threshold or if the query fails.
pub async fn at_risk_customers(
    executor: &QueryExecutor,
    params: &AtRiskParams,
) -> Result<Vec<RecordRow>, InsightsError> {
    let stmt = at_risk_statement(params.min_mrr)?;
    let rows = executor.execute(&stmt).await?;
    log::info!("Found {} at-risk customer(s) ({})", rows.len(), stmt.summary());
    Ok(rows)
}

/// Builds the per-customer ticket metrics statement used for health
/// scoring. Picks the highest-revenue customer whose name matches.
///
/// # Errors
///
/// Returns [`InsightsError::InvalidArgument`] if the name is blank.
pub fn health_metrics_statement(customer_name: &str) -> Result<ReadOnlyStatement, InsightsError> {
    let customer_name = required_text("customerName", customer_name)?;
    let unresolved = status_list(&TicketStatus::UNRESOLVED);
    let resolved = status_list(&TicketStatus::RESOLVED);

    let sql = format!(
        "SELECT c.id, c.name,
                c.subscription_tier::text AS subscription_tier,
                c.mrr::float8 AS mrr,
                GREATEST(CURRENT_DATE - c.created_at::date, 0)::bigint AS tenure_days,
                COUNT(t.id) AS total_tickets,
                COUNT(t.id) FILTER (WHERE t.status::text IN ({resolved})) AS resolved_tickets,
                COUNT(t.id) FILTER (WHERE t.status::text IN ({unresolved}) AND t.priority::text = '{high}') AS open_high,
                COUNT(t.id) FILTER (WHERE t.status::text IN ({unresolved}) AND t.priority::text = '{medium}') AS open_medium,
                COUNT(t.id) FILTER (WHERE t.status::text IN ({unresolved}) AND t.priority::text = '{low}') AS open_low,
                (AVG(EXTRACT(EPOCH FROM (t.resolved_at - t.created_at))) / 86400.0)::float8 AS avg_resolution_days
         FROM customers c
         LEFT JOIN support_tickets t ON t.customer_id = c.id
         WHERE c.name ILIKE $1
         GROUP BY c.id
         ORDER BY c.mrr DESC, c.id
         LIMIT 1",
        high = TicketPriority::High,
        medium = TicketPriority::Medium,
        low = TicketPriority::Low,
    );

    Ok(ReadOnlyStatement::fixed(
        "get_customer_health_score",
        sql,
        vec![DatabaseValue::String(contains_pattern(customer_name))],
        summarize("customerName", customer_name),
    ))
}

fn count(row: &switchy_database::Row, column: &str) -> u64 {
    let value: i64 = row.to_value(column).unwrap_or(0);
    u64::try_from(value).unwrap_or(0)
}

/// Fetches a customer's ticket metrics and scores them.
///
/// Returns `Ok(None)` when no customer name matches.
///
/// # Errors
///
/// Returns [`InsightsError`] if the name is blank or the query fails.
pub async fn customer_health_score(
    executor: &QueryExecutor,
    params: &HealthScoreParams,
) -> Result<Option<HealthScoreResult>, InsightsError> {
    let stmt = health_metrics_statement(&params.customer_name)?;
    let rows = executor.fetch_rows(&stmt).await?;

    let Some(row) = rows.first() else {
        log::warn!("No customer found for {}", stmt.summary());
        return Ok(None);
    };

    let customer = CustomerRef {
        id: row.to_value("id").unwrap_or(0),
        name: row.to_value("name").unwrap_or_default(),
        subscription_tier: row.to_value("subscription_tier").unwrap_or_default(),
        mrr: row.to_value("mrr").unwrap_or(0.0),
    };

    let metrics = TicketMetrics {
        total_tickets: count(row, "total_tickets"),
        resolved_tickets: count(row, "resolved_tickets"),
        open_high: count(row, "open_high"),
        open_medium: count(row, "open_medium"),
        open_low: count(row, "open_low"),
        tenure_days: count(row, "tenure_days"),
        avg_resolution_days: row.to_value("avg_resolution_days").unwrap_or(None),
    };

    let result = health::score(customer, &metrics);
    log::info!(
        "Health score for {}: {} ({}, {} open of {} tickets)",
        result.customer.name,
        result.score,
        result.band,
        metrics.open_tickets(),
        metrics.total_tickets
    );

    Ok(Some(result))
}
