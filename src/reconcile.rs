use crate::schema::{AttributeBag, ConsistencyVerdict};

/// Outcome of reconciling the text-derived and image-derived records for one
/// row. `Dropped` marks the row unenrichable for this pass; it is not retried
/// automatically.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    Keep(AttributeBag),
    Dropped,
}

/// Combines the two extraction sources using the image record's consistency
/// verdict:
///
/// - `match`: the shared block (category, colors, fabric, season, ...) comes
///   from the text source; the per-category fields come from the image.
/// - `mismatch` / `cropped`: only the category comes from the text source;
///   everything else is image-derived, which the prompt already scopes to the
///   item the text described.
/// - `missing`: the item is not in the image at all; the record is dropped.
/// - no image record, or an image record without a verdict: whichever source
///   is present is used as-is (a verdict-less image record is treated as a
///   match).
pub fn reconcile(text: Option<AttributeBag>, image: Option<AttributeBag>) -> Reconciled {
    let Some(mut image_bag) = image else {
        return match text {
            Some(bag) => Reconciled::Keep(bag),
            None => Reconciled::Dropped,
        };
    };

    let verdict = image_bag.verdict().unwrap_or(ConsistencyVerdict::Match);
    let Some(text_bag) = text else {
        return match verdict {
            ConsistencyVerdict::Missing => Reconciled::Dropped,
            _ => Reconciled::Keep(image_bag),
        };
    };

    match verdict {
        ConsistencyVerdict::Missing => Reconciled::Dropped,
        ConsistencyVerdict::Match => {
            *image_bag.shared_mut() = text_bag.shared().clone();
            image_bag.shared_mut().consistency_check = Some(ConsistencyVerdict::Match);
            Reconciled::Keep(image_bag)
        }
        ConsistencyVerdict::Mismatch | ConsistencyVerdict::Cropped => {
            image_bag.shared_mut().category = text_bag.shared().category.clone();
            Reconciled::Keep(image_bag)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::test_support::footwear_bag;

    #[test]
    fn text_only_record_passes_through() {
        let text = footwear_bag("sneakers", None);
        assert_eq!(reconcile(Some(text.clone()), None), Reconciled::Keep(text));
    }

    #[test]
    fn match_verdict_takes_shared_block_from_text() {
        let mut text = footwear_bag("loafers", None);
        text.shared_mut().color_tone = "saturated".into();
        let mut image = footwear_bag("boots", Some(ConsistencyVerdict::Match));
        if let AttributeBag::Footwear(attrs) = &mut image {
            attrs.sole_profile = "chunky".into();
        }

        let Reconciled::Keep(merged) = reconcile(Some(text), Some(image)) else {
            panic!("match verdict must keep the record");
        };
        assert_eq!(merged.category(), "loafers");
        assert_eq!(merged.shared().color_tone, "saturated");
        assert_eq!(merged.verdict(), Some(ConsistencyVerdict::Match));
        let AttributeBag::Footwear(attrs) = merged else {
            panic!("meta changed during reconciliation");
        };
        assert_eq!(attrs.sole_profile, "chunky");
    }

    #[test]
    fn mismatch_keeps_image_fields_except_category() {
        let mut text = footwear_bag("loafers", None);
        text.shared_mut().color_tone = "saturated".into();
        let mut image = footwear_bag("boots", Some(ConsistencyVerdict::Mismatch));
        image.shared_mut().color_tone = "deep".into();

        let Reconciled::Keep(merged) = reconcile(Some(text), Some(image)) else {
            panic!("mismatch verdict must keep the record");
        };
        assert_eq!(merged.category(), "loafers");
        assert_eq!(merged.shared().color_tone, "deep");
        assert_eq!(merged.verdict(), Some(ConsistencyVerdict::Mismatch));
    }

    #[test]
    fn missing_verdict_drops_the_record() {
        let text = footwear_bag("loafers", None);
        let image = footwear_bag("boots", Some(ConsistencyVerdict::Missing));
        assert_eq!(reconcile(Some(text), Some(image)), Reconciled::Dropped);
        assert_eq!(
            reconcile(None, Some(footwear_bag("boots", Some(ConsistencyVerdict::Missing)))),
            Reconciled::Dropped
        );
    }

    #[test]
    fn image_without_verdict_is_treated_as_match() {
        let image = footwear_bag("boots", None);
        let Reconciled::Keep(merged) = reconcile(None, Some(image)) else {
            panic!("image-only record must be kept");
        };
        assert_eq!(merged.category(), "boots");
    }

    #[test]
    fn nothing_to_reconcile_is_dropped() {
        assert_eq!(reconcile(None, None), Reconciled::Dropped);
    }
}
