/// Popup UI: save the current tab, or bulk-save open tabs

use crate::bookmark::save_tab;
use crate::browser::{ApiBookmarkCreator, ChromeStorage, ChromeTabs, TimeoutPacer};
use crate::bulk_save::{BulkSaveError, BulkSaveOrchestrator, BulkSaveStatus, PACING_DELAY_MS};
use crate::config::Configuration;
use crate::config_store::ConfigStore;
use crate::handoff::take_bulk_save_request;
use crate::host::TabHost;
use crate::tab_data::SaveType;
use crate::ui::components::BulkSaveProgress;
use patternfly_yew::prelude::*;
use std::rc::Rc;
use wasm_bindgen_futures::spawn_local;
use web_sys::HtmlInputElement;
use yew::prelude::*;

#[derive(Clone, PartialEq)]
enum Notice {
    Saved(String),
    Error(String),
}

type PopupOrchestrator = BulkSaveOrchestrator<ApiBookmarkCreator, ChromeTabs, TimeoutPacer>;

#[function_component(App)]
pub fn app() -> Html {
    let settings = use_state(|| None::<Configuration>);
    let bulk_status = use_state(BulkSaveStatus::default);
    let notice = use_state(|| None::<Notice>);
    // One orchestrator per popup, so its running flag covers every trigger
    let orchestrator = use_memo((), |_| {
        BulkSaveOrchestrator::new(
            ApiBookmarkCreator::new(),
            ChromeTabs,
            TimeoutPacer::new(PACING_DELAY_MS),
        )
    });

    // Load settings, follow changes from other surfaces, and pick up a
    // pending hand-off request
    {
        let settings = settings.clone();
        let bulk_status = bulk_status.clone();
        let notice = notice.clone();
        let orchestrator = orchestrator.clone();

        use_effect_with((), move |_| {
            let watched = settings.clone();
            let subscription = ConfigStore::new(ChromeStorage::settings())
                .subscribe(move |config| watched.set(Some(config)));

            spawn_local(async move {
                let config = ConfigStore::new(ChromeStorage::settings()).read().await;
                settings.set(Some(config.clone()));

                if let Some(request) = take_bulk_save_request(&ChromeStorage::session()).await {
                    if config.is_configured() && !orchestrator.is_running() {
                        bulk_status.set(BulkSaveStatus::pending(request.save_type));
                        run_bulk_save(orchestrator, request.save_type, bulk_status, notice).await;
                    }
                }
            });

            move || drop(subscription)
        });
    }

    let on_bulk_save = {
        let settings = settings.clone();
        let bulk_status = bulk_status.clone();
        let notice = notice.clone();

        move |scope: SaveType| {
            let settings = settings.clone();
            let bulk_status = bulk_status.clone();
            let notice = notice.clone();
            let orchestrator = orchestrator.clone();

            Callback::from(move |_| {
                if bulk_status.is_active || orchestrator.is_running() {
                    return;
                }
                if !(*settings).as_ref().is_some_and(|c| c.is_configured()) {
                    return;
                }
                // Busy before the run is spawned; the orchestrator claims
                // the run on its first poll
                bulk_status.set(BulkSaveStatus::pending(scope));
                notice.set(None);

                spawn_local(run_bulk_save(
                    orchestrator.clone(),
                    scope,
                    bulk_status.clone(),
                    notice.clone(),
                ));
            })
        }
    };

    let on_save_current = {
        let settings = settings.clone();
        let notice = notice.clone();

        Callback::from(move |_| {
            if !(*settings).as_ref().is_some_and(|c| c.is_configured()) {
                return;
            }
            let notice = notice.clone();

            spawn_local(async move {
                let creator = ApiBookmarkCreator::new();
                let tab = match ChromeTabs.query_tabs(SaveType::Window).await {
                    Ok(tabs) => tabs.into_iter().find(|t| t.active),
                    Err(e) => {
                        notice.set(Some(Notice::Error(e.to_string())));
                        return;
                    }
                };
                let Some(tab) = tab else {
                    return;
                };

                match save_tab(&creator, &tab).await {
                    Ok(_) => notice.set(Some(Notice::Saved(format!("Saved {}", tab.display_label())))),
                    Err(e) => notice.set(Some(Notice::Error(e.to_string()))),
                }
            });
        })
    };

    let on_close_tabs_toggle = {
        Callback::from(move |e: Event| {
            let Some(input) = e.target_dyn_into::<HtmlInputElement>() else {
                return;
            };
            let close_tabs = input.checked();

            spawn_local(async move {
                let store = ConfigStore::new(ChromeStorage::settings());
                let result = store
                    .write(|mut config| {
                        config.close_tabs_on_bulk_save = close_tabs;
                        config
                    })
                    .await;
                if let Err(e) = result {
                    log::warn!("Could not save close-tabs preference: {}", e);
                }
            });
        })
    };

    let is_busy = bulk_status.is_active;
    let configured = (*settings).as_ref().is_some_and(|c| c.is_configured());
    let close_tabs = (*settings).as_ref().is_some_and(|c| c.close_tabs_on_bulk_save);

    html! {
        <div class="padding-20">
            <h1 class="popup-title">{"Tab Bookmarker"}</h1>

            if settings.is_none() {
                <div class="loading-text-center">
                    <Spinner />
                </div>
            } else if !configured {
                <Alert r#type={AlertType::Info} title={"Add your API key in the options page to start saving."} inline={true}>
                </Alert>
            }

            {match &*notice {
                Some(Notice::Saved(msg)) => html! {
                    <Alert r#type={AlertType::Success} title={msg.clone()} inline={true}>
                    </Alert>
                },
                Some(Notice::Error(msg)) => html! {
                    <Alert r#type={AlertType::Danger} title={"Error"} inline={true}>
                        {msg.clone()}
                    </Alert>
                },
                None => html! {},
            }}

            <div class="flex-column-gap">
                <Button onclick={on_save_current} disabled={is_busy || !configured} variant={ButtonVariant::Primary} block={true}>
                    {"Save This Tab"}
                </Button>
                <Button onclick={on_bulk_save(SaveType::Window)} disabled={is_busy || !configured} variant={ButtonVariant::Secondary} block={true}>
                    {"Save Tabs in This Window"}
                </Button>
                <Button onclick={on_bulk_save(SaveType::All)} disabled={is_busy || !configured} variant={ButtonVariant::Secondary} block={true}>
                    {"Save All Open Tabs"}
                </Button>
                <label class="checkbox-label">
                    <input
                        type="checkbox"
                        checked={close_tabs}
                        disabled={is_busy}
                        onchange={on_close_tabs_toggle}
                    />
                    {" Close tabs after saving"}
                </label>
            </div>

            <BulkSaveProgress status={(*bulk_status).clone()} />

            <p class="footer-popup">
                {"Tab Bookmarker v0.1.0"}
            </p>
        </div>
    }
}

async fn run_bulk_save(
    orchestrator: Rc<PopupOrchestrator>,
    scope: SaveType,
    bulk_status: UseStateHandle<BulkSaveStatus>,
    notice: UseStateHandle<Option<Notice>>,
) {
    let settings = ConfigStore::new(ChromeStorage::settings());

    let result = orchestrator
        .save_open_tabs(scope, &settings, |status| bulk_status.set(status.clone()))
        .await;

    match result {
        Ok(_) => {}
        // The run already in progress owns the status
        Err(BulkSaveError::AlreadyRunning) => log::debug!("Bulk save already in progress"),
        Err(e) => {
            bulk_status.set(BulkSaveStatus::default());
            notice.set(Some(Notice::Error(e.to_string())));
        }
    }
}
