use crate::domain::customer::CreditLimit;
use crate::error::Result;
use std::io::Write;

/// Writes credit limits as CSV:
/// `customer,tenor,amount,used,available,version`.
pub struct LimitWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LimitWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_limits<I>(&mut self, limits: I) -> Result<()>
    where
        I: IntoIterator<Item = CreditLimit>,
    {
        self.writer
            .write_record(["customer", "tenor", "amount", "used", "available", "version"])?;
        for limit in limits {
            self.writer.write_record([
                limit.customer_id.to_string(),
                limit.tenor.to_string(),
                limit.amount.to_string(),
                limit.used_amount.to_string(),
                limit.available().to_string(),
                limit.version.to_string(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::{Amount, Money};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_write_limits() {
        let mut limit = CreditLimit::new(3, 6, Amount::new(dec!(2000000.00)).unwrap(), Utc::now());
        limit.used_amount = Money::new(dec!(500000.50));
        limit.version = 2;

        let mut out = Vec::new();
        LimitWriter::new(&mut out).write_limits([limit]).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "customer,tenor,amount,used,available,version\n3,6,2000000,500000.5,1499999.5,2\n"
        );
    }
}
