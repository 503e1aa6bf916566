// Price-list import: parse the ticket's spreadsheet attachment and upsert
// each model's price
//
// The attachment name is validated before any workflow transition, so a
// ticket with a bad file stays where it is with an explanatory comment.
// Parse failures after the transitions behave the same; database failures
// end the worker abnormally.

use std::io::Cursor;
use std::sync::OnceLock;

use anyhow::Context;
use async_trait::async_trait;
use calamine::{Data, Reader, Xlsx};
use regex::Regex;
use tracing::{error, info};

use ticketd_core::{
    HandlerContext, HandlerError, HandlerRegistry, HandlerSpec, TicketHandler, Transition,
};
use ticketd_storage::Database;

const SHEET_NAME: &str = "Prices";
const EXPECTED_HEADERS: [&str; 8] = [
    "MODEL_CODE",
    "CBM",
    "WEIGHT",
    "HEIGHT",
    "WIDTH",
    "DEPTH",
    "PRODUCT",
    "PRICE",
];
const PRODUCT_COLUMN: usize = 6;
const PRICE_COLUMN: usize = 7;
const INVALID_FILE_COMMENT: &str = "The attached file is not valid";

pub fn register(registry: &mut HandlerRegistry) {
    registry.register::<PriceListImportHandler>();
}

pub struct PriceListImportHandler {
    ctx: HandlerContext,
    database: Database,
}

#[async_trait]
impl HandlerSpec for PriceListImportHandler {
    const KIND: &'static str = "price_list";

    async fn build(ctx: HandlerContext) -> Result<Self, HandlerError> {
        let settings = ctx
            .database
            .as_ref()
            .ok_or_else(|| HandlerError::database("price list handler requires a database"))?;
        let database = Database::connect(settings)
            .await
            .map_err(|err| HandlerError::database(err.to_string()))?;
        Ok(Self { ctx, database })
    }
}

#[async_trait]
impl TicketHandler for PriceListImportHandler {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    async fn run(&mut self) -> Result<(), HandlerError> {
        let ticket = self.ctx.ticket.clone();

        let Some(attachment) = ticket.first_attachment().cloned() else {
            error!(ticket = %ticket.key, "ticket has no attachment");
            self.ctx.include_comment(INVALID_FILE_COMMENT).await?;
            return Ok(());
        };
        if !valid_filename(&attachment.filename) {
            error!(
                ticket = %ticket.key,
                filename = %attachment.filename,
                "attachment name is not valid"
            );
            self.ctx.include_comment(INVALID_FILE_COMMENT).await?;
            return Ok(());
        }

        let content = self.ctx.tracker.fetch_attachment(&attachment).await?;

        self.ctx.set_status(Transition::Take).await;
        self.ctx.set_status(Transition::AnalyzeProblem).await;
        self.ctx.set_status(Transition::WorkInLocalSolution).await;

        let rows = match parse_price_sheet(&content) {
            Ok(rows) => rows,
            Err(err) => {
                error!(ticket = %ticket.key, error = %err, "attachment did not parse");
                self.ctx.include_comment(INVALID_FILE_COMMENT).await?;
                return Ok(());
            }
        };

        for row in &rows {
            self.database
                .upsert_price(&row.model, row.price)
                .await
                .with_context(|| format!("price upsert failed for model {}", row.model))?;
        }

        info!(ticket = %ticket.key, rows = rows.len(), "price list imported");
        self.ctx
            .include_comment("Price list processed, ticket resolved.")
            .await?;
        self.ctx.set_status(Transition::Resolve).await;
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
struct PriceRow {
    model: String,
    price: f64,
}

fn valid_filename(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^PRICELIST_.*\.xlsx$").expect("filename pattern compiles"))
        .is_match(name)
}

fn parse_price_sheet(content: &[u8]) -> anyhow::Result<Vec<PriceRow>> {
    let mut workbook: Xlsx<_> =
        calamine::open_workbook_from_rs(Cursor::new(content)).context("not a readable workbook")?;
    let range = workbook
        .worksheet_range(SHEET_NAME)
        .with_context(|| format!("missing sheet {SHEET_NAME}"))?;

    let mut rows = range.rows();
    let header = rows.next().context("sheet is empty")?;
    validate_headers(header)?;
    // The row under the header carries units, not data.
    let _ = rows.next();

    let mut prices = Vec::new();
    for (index, row) in rows.enumerate() {
        let model = cell_string(row.get(PRODUCT_COLUMN));
        let price = cell_number(row.get(PRICE_COLUMN));
        match (model, price) {
            (Some(model), Some(price)) => prices.push(PriceRow { model, price }),
            (None, None) => continue,
            _ => anyhow::bail!("row {} is incomplete", index + 3),
        }
    }
    Ok(prices)
}

fn validate_headers(header: &[Data]) -> anyhow::Result<()> {
    let names: Vec<String> = header
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();
    anyhow::ensure!(
        names.iter().map(String::as_str).eq(EXPECTED_HEADERS),
        "unexpected column headers: {names:?}"
    );
    Ok(())
}

fn cell_string(cell: Option<&Data>) -> Option<String> {
    match cell? {
        Data::String(value) => {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Data::Int(value) => Some(value.to_string()),
        Data::Float(value) => Some(value.to_string()),
        _ => None,
    }
}

fn cell_number(cell: Option<&Data>) -> Option<f64> {
    match cell? {
        Data::Float(value) => Some(*value),
        Data::Int(value) => Some(*value as f64),
        Data::String(value) => value.trim().parse().ok(),
        _ => None,
    }
}
