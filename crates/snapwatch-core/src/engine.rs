use crate::alert::{matching, AlertMode, AlertPredicate};
use crate::diff::{diff, Delta};
use crate::ids::EntityId;
use crate::message::{render_all_clear, render_delta, render_matches, Message};
use crate::model::Snapshot;

/// Pure decision for one run: what changed and what (if anything) to send.
///
/// The imperative shell owns loading, dispatching and saving. It dispatches
/// `message` when present and only then persists the current snapshot.
#[derive(Clone, Debug, Default)]
pub struct Plan {
    pub delta: Delta,
    pub matched: Vec<EntityId>,
    pub message: Option<Message>,
}

impl Plan {
    pub fn dispatch_required(&self) -> bool {
        self.message.is_some()
    }
}

pub fn plan(label: &str, mode: &AlertMode, previous: &Snapshot, current: &Snapshot) -> Plan {
    let delta = diff(previous, current);

    match mode {
        AlertMode::Added => {
            let message = (!delta.added.is_empty()).then(|| {
                // additions only; removals are not news for this mode
                let added_only = Delta { added: delta.added.clone(), ..Delta::default() };
                render_delta(label, &added_only, previous, current)
            });
            Plan { delta, matched: vec![], message }
        }
        AlertMode::AnyChange => {
            let message = (!delta.is_empty()).then(|| render_delta(label, &delta, previous, current));
            Plan { delta, matched: vec![], message }
        }
        AlertMode::Predicate { rule, report_all_clear } => {
            plan_with_predicate(label, rule, *report_all_clear, delta, current)
        }
    }
}

/// Predicate path with an arbitrary injected predicate.
pub fn plan_with_predicate<P>(
    label: &str,
    predicate: &P,
    report_all_clear: bool,
    delta: Delta,
    current: &Snapshot,
) -> Plan
where
    P: AlertPredicate + ?Sized,
{
    let hits = matching(current, predicate);
    let matched = hits.iter().map(|(id, _)| (*id).clone()).collect();
    let message = if !hits.is_empty() {
        Some(render_matches(label, &hits))
    } else if report_all_clear {
        Some(render_all_clear(label, current.len()))
    } else {
        None
    };
    Plan { delta, matched, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertRule;
    use crate::model::{EntityRecord, FieldValue};

    fn reviews(n: i64) -> EntityRecord {
        let mut rec = EntityRecord::new();
        rec.insert("reviews".into(), FieldValue::Integer(n));
        rec
    }

    #[test]
    fn added_mode_ignores_pure_removals() {
        let previous = Snapshot::from_ids(["a", "b"]);
        let current = Snapshot::from_ids(["a"]);
        let p = plan("t", &AlertMode::Added, &previous, &current);
        assert!(!p.dispatch_required());
        assert_eq!(p.delta.removed.len(), 1);
    }

    #[test]
    fn added_mode_message_lists_only_additions() {
        let previous = Snapshot::from_ids(["a", "b"]);
        let current = Snapshot::from_ids(["a", "c"]);
        let p = plan("t", &AlertMode::Added, &previous, &current);
        let msg = p.message.unwrap();
        assert_eq!(msg.subject, "[snapwatch] t: 1 new");
        assert_eq!(msg.body, "+ c");
    }

    #[test]
    fn any_change_mode_alerts_on_removal() {
        let previous = Snapshot::from_ids(["a", "b"]);
        let current = Snapshot::from_ids(["a"]);
        let p = plan("t", &AlertMode::AnyChange, &previous, &current);
        assert_eq!(p.message.unwrap().body, "- b");
    }

    #[test]
    fn first_run_alerts_for_everything() {
        let current = Snapshot::from_ids(["a", "b", "c"]);
        let p = plan("t", &AlertMode::Added, &Snapshot::new(), &current);
        assert!(p.message.unwrap().subject.ends_with("3 new"));
    }

    #[test]
    fn predicate_mode_ignores_delta() {
        let mut current = Snapshot::new();
        current.insert("ghost", reviews(12));
        current.insert("glycerin", reviews(0));
        let mode = AlertMode::Predicate {
            rule: AlertRule::Below { field: "reviews".into(), threshold: 1.0 },
            report_all_clear: false,
        };
        // same snapshot on both sides: no delta, still alerts
        let p = plan("shoes", &mode, &current, &current);
        assert!(p.delta.is_empty());
        assert_eq!(p.matched, vec![EntityId::from("glycerin")]);
        assert!(p.dispatch_required());
    }

    #[test]
    fn predicate_mode_without_matches() {
        let mut current = Snapshot::new();
        current.insert("ghost", reviews(12));
        let quiet = AlertMode::Predicate {
            rule: AlertRule::Below { field: "reviews".into(), threshold: 1.0 },
            report_all_clear: false,
        };
        assert!(!plan("shoes", &quiet, &Snapshot::new(), &current).dispatch_required());

        let chatty = AlertMode::Predicate {
            rule: AlertRule::Below { field: "reviews".into(), threshold: 1.0 },
            report_all_clear: true,
        };
        let p = plan("shoes", &chatty, &Snapshot::new(), &current);
        assert_eq!(p.message.unwrap().subject, "[Info] shoes: all clear");
        assert!(p.matched.is_empty());
    }
}
