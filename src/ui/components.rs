/// Reusable UI components

use crate::bulk_save::{BulkSaveStatus, BulkSaveSummary, RunState};
use patternfly_yew::prelude::*;
use yew::prelude::*;

#[derive(Properties, PartialEq)]
pub struct BulkSaveProgressProps {
    pub status: BulkSaveStatus,
}

/// Progress bar while a bulk save runs, then its summary and first errors
#[function_component(BulkSaveProgress)]
pub fn bulk_save_progress(props: &BulkSaveProgressProps) -> Html {
    let status = &props.status;

    match status.state() {
        RunState::Idle => html! {},
        RunState::Running if status.total == 0 => html! {
            <div class="message-top-margin">
                <p class="message-text">{"Collecting tabs..."}</p>
                <Spinner />
            </div>
        },
        RunState::Running => html! {
            <div class="message-top-margin">
                <p class="message-text">
                    {format!("Saving tabs... {} of {}", status.processed(), status.total)}
                </p>
                <Progress value={status.progress as f64} />
            </div>
        },
        RunState::Completed => {
            let summary = status.summary();
            let alert_type = match summary {
                Some(BulkSaveSummary::AllSaved { .. }) => AlertType::Success,
                Some(BulkSaveSummary::Partial { .. }) => AlertType::Warning,
                _ => AlertType::Danger,
            };
            let title = summary.map(|s| s.to_string()).unwrap_or_default();

            html! {
                <div class="message-top-margin">
                    <Alert r#type={alert_type} title={title} inline={true}>
                        <ErrorList lines={status.error_preview()} />
                    </Alert>
                </div>
            }
        }
    }
}

#[derive(Properties, PartialEq)]
pub struct ErrorListProps {
    pub lines: Vec<String>,
}

#[function_component(ErrorList)]
pub fn error_list(props: &ErrorListProps) -> Html {
    if props.lines.is_empty() {
        return html! {};
    }

    html! {
        <ul class="error-list">
            {for props.lines.iter().map(|line| html! {
                <li class="error-item">{line}</li>
            })}
        </ul>
    }
}
