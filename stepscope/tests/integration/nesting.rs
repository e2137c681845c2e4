// Copyright (c) The stepscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{catch, recording_session};
use proptest::{collection::vec, prelude::*};
use stepscope::{ScopeStatus, StepConfig, step};
use test_strategy::{Arbitrary, proptest};

/// What a step does after running its children.
#[derive(Clone, Copy, Debug, Arbitrary)]
enum Action {
    Nothing,
    CatchPanic,
    Panic,
}

/// A tree of steps to run.
#[derive(Clone, Debug)]
struct Plan {
    propagate: bool,
    raise_on_parent: bool,
    action: Action,
    children: Vec<Plan>,
}

impl Plan {
    fn strategy() -> impl Strategy<Value = Self> {
        let leaf = (any::<bool>(), any::<bool>(), any::<Action>()).prop_map(
            |(propagate, raise_on_parent, action)| Self {
                propagate,
                raise_on_parent,
                action,
                children: Vec::new(),
            },
        );
        leaf.prop_recursive(4, 24, 3, |inner| {
            (any::<bool>(), any::<bool>(), any::<Action>(), vec(inner, 0..3)).prop_map(
                |(propagate, raise_on_parent, action, children)| Self {
                    propagate,
                    raise_on_parent,
                    action,
                    children,
                },
            )
        })
    }

    fn len(&self) -> usize {
        1 + self.children.iter().map(Plan::len).sum::<usize>()
    }

    /// Whether any panic is raised while this step is open.
    fn raises(&self) -> bool {
        !matches!(self.action, Action::Nothing) || self.children.iter().any(Plan::raises)
    }

    /// Appends the expected status of this step and its descendants, in the
    /// order titles are assigned.
    fn expected_statuses(&self, out: &mut Vec<ScopeStatus>) {
        let status = if matches!(self.action, Action::Panic) || (self.propagate && self.raises()) {
            ScopeStatus::Failed
        } else {
            ScopeStatus::Passed
        };
        out.push(status);
        for child in &self.children {
            child.expected_statuses(out);
        }
    }

    /// Runs this plan. Each step catches whatever escapes its children, so
    /// every step in the plan runs.
    fn run(&self, next_index: &mut usize) {
        let title = format!("s{next_index}");
        *next_index += 1;
        step(title)
            .propagate(self.propagate)
            .raise_on_parent(self.raise_on_parent)
            .run(|| {
                for child in &self.children {
                    _ = catch(|| child.run(next_index));
                }
                match self.action {
                    Action::Nothing => {}
                    Action::CatchPanic => {
                        _ = catch(|| panic!("caught"));
                    }
                    Action::Panic => panic!("escaped"),
                }
            });
    }
}

#[proptest(cases = 64)]
fn every_scope_reports_once(#[strategy(Plan::strategy())] plan: Plan) {
    let (session, sink) = recording_session(StepConfig::default());

    session.in_scope(|| {
        _ = catch(|| plan.run(&mut 0));
    });

    let reports = sink.reports();
    assert_eq!(reports.len(), plan.len());
    assert_eq!(sink.started().len(), plan.len());
    assert!(reports.iter().all(|report| report.status.is_terminal()));

    let mut expected = Vec::new();
    plan.expected_statuses(&mut expected);
    for (index, status) in expected.into_iter().enumerate() {
        let title = format!("s{index}");
        let report = sink.find(&title).unwrap();
        assert_eq!(report.status, status, "status of {title} in {plan:?}");
    }

    // The stack is empty at rest: a new step has no parent.
    let after = session.in_scope(|| step("after").enter().id());
    let after = sink.reports().into_iter().find(|r| r.id == after).unwrap();
    assert_eq!(after.parent_id, None);
}
