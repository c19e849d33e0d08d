use super::{error::CheckoutError, snapshot::BagSnapshot};

/// Computes the amount to charge for a snapshot, in minor currency units.
///
/// This is the only source of the charged amount; totals supplied by a client
/// are never consulted.
pub fn charge_total(snapshot: &BagSnapshot) -> Result<i64, CheckoutError> {
    snapshot.lines.iter().try_fold(0_i64, |total, line| {
        if line.quantity <= 0 {
            return Err(CheckoutError::InvalidSnapshot(format!(
                "bag entry {} has non-positive quantity {}",
                line.bag_entry_id, line.quantity
            )));
        }
        if line.item.price < 0 {
            return Err(CheckoutError::InvalidSnapshot(format!(
                "item {} has negative price {}",
                line.item.item_id, line.item.price
            )));
        }

        line.item
            .price
            .checked_mul(i64::from(line.quantity))
            .and_then(|subtotal| total.checked_add(subtotal))
            .ok_or_else(|| CheckoutError::InvalidSnapshot("order total overflows".into()))
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::checkout::snapshot::{ItemFields, SnapshotLine};

    fn line(price: i64, quantity: i32) -> SnapshotLine {
        SnapshotLine {
            bag_entry_id: Uuid::new_v4(),
            item: ItemFields {
                item_id: Uuid::new_v4(),
                title: "thing".into(),
                description: "a thing".into(),
                price,
                image: None,
                large_image: None,
            },
            quantity,
        }
    }

    fn snapshot(lines: Vec<SnapshotLine>) -> BagSnapshot {
        BagSnapshot::new(Uuid::new_v4(), lines, Utc::now())
    }

    #[test]
    fn sums_price_times_quantity() {
        let total = charge_total(&snapshot(vec![line(500, 2), line(1200, 1)])).unwrap();
        assert_eq!(total, 2200);
    }

    #[test]
    fn total_does_not_depend_on_line_order() {
        let lines = vec![line(500, 2), line(1200, 1), line(1, 99), line(0, 3)];
        let mut reversed = lines.clone();
        reversed.reverse();

        assert_eq!(
            charge_total(&snapshot(lines)).unwrap(),
            charge_total(&snapshot(reversed)).unwrap()
        );
    }

    #[test]
    fn empty_snapshot_totals_zero() {
        assert_eq!(charge_total(&snapshot(vec![])).unwrap(), 0);
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let err = charge_total(&snapshot(vec![line(500, 0)])).unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidSnapshot(_)));
    }

    #[test]
    fn rejects_negative_price() {
        let err = charge_total(&snapshot(vec![line(-1, 1)])).unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidSnapshot(_)));
    }

    #[test]
    fn rejects_overflow() {
        let err = charge_total(&snapshot(vec![line(i64::MAX, 2)])).unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidSnapshot(_)));
    }
}
