use crate::application::ledger::MerchantStatement;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct SummaryRecord<'a> {
    merchant: &'a str,
    balance: String,
    credits: String,
    debits: String,
    entries: usize,
}

/// Writes `merchant,balance,credits,debits,entries` rows.
pub struct SummaryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> SummaryWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_statements(&mut self, mut statements: Vec<MerchantStatement>) -> Result<()> {
        statements.sort_by(|a, b| a.merchant_id.cmp(&b.merchant_id));
        for statement in &statements {
            self.writer.serialize(SummaryRecord {
                merchant: &statement.merchant_id,
                balance: statement.balance.value().normalize().to_string(),
                credits: statement.credits.normalize().to_string(),
                debits: statement.debits.normalize().to_string(),
                entries: statement.entries,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
