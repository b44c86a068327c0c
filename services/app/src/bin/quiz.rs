//! services/app/src/bin/quiz.rs
//!
//! Terminal front end for the daily quiz: signs in, walks the profile gates,
//! then offers today's quiz, the notification feed and the dashboard.

use app_lib::{
    adapters::{AuthRestAdapter, ReqwestTransport},
    config::Config,
    error::AppError,
};
use daily_quiz_core::{
    dashboard::Dashboard,
    flow::{FlowNotice, FlowPhase, QuizFlow},
    notifications::{NotificationFeed, NotificationFilter},
    onboarding::{OnboardingStep, OnboardingWizard, MAIN_GOALS},
    profile::{ProfileGate, ProfileResolver},
    results::ResultsView,
    unread::UnreadCounter,
    ApiClient,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

//=========================================================================================
// Line Input
//=========================================================================================

struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Prints `label` and reads one trimmed line. `None` on end of input.
    async fn ask(&mut self, label: &str) -> Result<Option<String>, AppError> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(format!("{label} > ").as_bytes()).await?;
        stdout.flush().await?;
        Ok(self.lines.next_line().await?.map(|line| line.trim().to_string()))
    }

    /// Reads a 1-based choice among `len` options.
    async fn choose(&mut self, label: &str, len: usize) -> Result<Option<usize>, AppError> {
        let Some(line) = self.ask(label).await? else {
            return Ok(None);
        };
        Ok(line
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=len).contains(n))
            .map(|n| n - 1))
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- 2. Initialize Adapters ---
    let auth = Arc::new(AuthRestAdapter::new(
        config.auth_url.clone(),
        config.auth_anon_key.clone(),
    ));
    let transport = Arc::new(ReqwestTransport::new(config.api_base_url.clone()));
    let mut prompt = Prompt::new();

    // --- 3. Sign In ---
    let email = match &config.quiz_email {
        Some(email) => email.clone(),
        None => prompt.ask("Email").await?.unwrap_or_default(),
    };
    let password = match &config.quiz_password {
        Some(password) => password.clone(),
        None => prompt.ask("Contraseña").await?.unwrap_or_default(),
    };
    auth.sign_in_with_password(&email, &password).await?;
    let api = ApiClient::new(transport, auth.clone());

    // --- 4. Profile Gates ---
    let profile = ProfileResolver::new(api.clone());
    if !pass_profile_gates(&profile, &mut prompt).await? {
        return Ok(());
    }
    if let Ok(current) = profile.profile().await {
        let name = current.display_name.as_deref().unwrap_or("estudiante");
        let avatar = current
            .avatar_id
            .as_deref()
            .map(|id| config.avatar_url(id))
            .unwrap_or_default();
        println!("\nHola, {name}! {avatar}");
    }

    // --- 5. Shared Unread Counter ---
    let counter = UnreadCounter::new(api.clone());
    let _ = counter.refresh_now().await;

    // --- 6. Main Menu ---
    loop {
        println!(
            "\n1) Quiz del día  2) Notificaciones ({})  3) Estadísticas  4) Salir",
            counter.count()
        );
        match prompt.choose("Elige una opción", 4).await? {
            Some(0) => run_quiz(QuizFlow::new(api.clone()), &mut prompt).await?,
            Some(1) => run_notifications(&api, &counter, &mut prompt).await?,
            Some(2) => show_dashboard(&Dashboard::new(api.clone())).await,
            Some(3) | None => break,
            Some(_) => {}
        }
        counter.refresh();
    }

    info!("Bye");
    Ok(())
}

//=========================================================================================
// Profile Gates and Onboarding
//=========================================================================================

/// Returns false when the user cannot continue.
async fn pass_profile_gates(profile: &ProfileResolver, prompt: &mut Prompt) -> Result<bool, AppError> {
    loop {
        match profile.gate().await? {
            ProfileGate::Ready => return Ok(true),
            ProfileGate::NeedsOnboarding => {
                println!("\nCompleta tu perfil antes de empezar.");
                if !run_onboarding(profile, prompt).await? {
                    return Ok(false);
                }
            }
            ProfileGate::NeedsDisplayName => {
                let Some(name) = prompt.ask("Elige un nombre visible").await? else {
                    return Ok(false);
                };
                if let Err(e) = profile.update_display_name(&name).await {
                    println!("{}", e.user_message());
                }
            }
        }
    }
}

async fn run_onboarding(profile: &ProfileResolver, prompt: &mut Prompt) -> Result<bool, AppError> {
    let mut wizard = OnboardingWizard::from_profile(&profile.profile().await?);
    if let Err(e) = wizard.load_catalogs(profile).await {
        warn!("Onboarding catalogs unavailable: {}", e);
    }

    loop {
        let step = wizard.step();
        match step {
            OnboardingStep::MedicalYear => {
                let Some(line) = prompt.ask("Curso (1-6)").await? else {
                    return Ok(false);
                };
                if let Ok(year) = line.parse() {
                    wizard.set_medical_year(year);
                }
            }
            OnboardingStep::Specialty => {
                let names = catalog_names(wizard.specialties());
                print_numbered(&names);
                let Some(line) = prompt.ask("Especialidad MIR (vacío para omitir)").await? else {
                    return Ok(false);
                };
                wizard.set_specialty(pick(&names, &line));
            }
            OnboardingStep::Goal => {
                let labels: Vec<String> = MAIN_GOALS.iter().map(|(_, label)| label.to_string()).collect();
                print_numbered(&labels);
                if let Some(i) = prompt.choose("Objetivo", labels.len()).await? {
                    wizard.set_goal(MAIN_GOALS[i].0);
                }
            }
            OnboardingStep::University => {
                let names = catalog_names(wizard.universities());
                print_numbered(&names);
                let Some(line) = prompt.ask("Universidad").await? else {
                    return Ok(false);
                };
                if let Some(university) = pick(&names, &line) {
                    wizard.set_university(&university);
                }
            }
            OnboardingStep::Visibility => {
                let Some(line) = prompt.ask("¿Perfil público? (s/n)").await? else {
                    return Ok(false);
                };
                wizard.set_public(line.eq_ignore_ascii_case("s"));
            }
            OnboardingStep::Review => {
                println!("{:#?}", wizard.draft());
                let Some(line) = prompt.ask("¿Enviar? (s/n, a para volver)").await? else {
                    return Ok(false);
                };
                if line.eq_ignore_ascii_case("a") {
                    wizard.back();
                    continue;
                }
                if !line.eq_ignore_ascii_case("s") {
                    return Ok(false);
                }
                return match wizard.submit(profile).await {
                    Ok(()) => Ok(true),
                    Err(e) => {
                        println!("{}", e.user_message());
                        Ok(false)
                    }
                };
            }
        }
        if let Err(e) = wizard.next() {
            println!("{}", e.user_message());
        }
    }
}

fn catalog_names(entries: &[daily_quiz_core::CatalogEntry]) -> Vec<String> {
    entries.iter().map(|entry| entry.name.clone()).collect()
}

/// A 1-based index into `names`, or free text when the list is empty.
fn pick(names: &[String], line: &str) -> Option<String> {
    if line.is_empty() {
        return None;
    }
    match line.parse::<usize>() {
        Ok(n) if (1..=names.len()).contains(&n) => Some(names[n - 1].clone()),
        _ => Some(line.to_string()),
    }
}

fn print_numbered(items: &[String]) {
    for (i, item) in items.iter().enumerate() {
        println!("  {}. {}", i + 1, item);
    }
}

//=========================================================================================
// Daily Quiz
//=========================================================================================

async fn run_quiz(mut flow: QuizFlow, prompt: &mut Prompt) -> Result<(), AppError> {
    loop {
        if flow.open(Instant::now()).await == FlowPhase::Answering
            && !answer(&mut flow, prompt).await?
        {
            flow.close();
            return Ok(());
        }

        if let Some(view) = flow.results_view() {
            print_results(&view);
            break;
        }
        match flow.notice().cloned() {
            Some(FlowNotice::Error { message, retryable: true }) => {
                println!("{message}");
                let again = prompt.ask("¿Reintentar? (s/n)").await?;
                if !again.is_some_and(|line| line.eq_ignore_ascii_case("s")) {
                    break;
                }
                flow.clear_notice();
            }
            Some(notice) => {
                println!("{}", describe(&notice));
                break;
            }
            None => break,
        }
    }

    flow.request_exit(Instant::now());
    if let Some(deadline) = flow.exit_deadline() {
        tokio::time::sleep_until(deadline).await;
        flow.poll_exit(Instant::now());
    }
    Ok(())
}

/// Runs the answering loop. Returns false if the user quit.
async fn answer(flow: &mut QuizFlow, prompt: &mut Prompt) -> Result<bool, AppError> {
    while flow.phase() == FlowPhase::Answering {
        let Some(session) = flow.session() else {
            return Ok(false);
        };
        let index = session.current_index();
        let total = session.questions().len();
        let selected = session.selected_answers()[index];
        let Some(question) = session.current_question() else {
            return Ok(false);
        };

        println!("\nPregunta {}/{}", index + 1, total);
        if let Some(subject) = &question.subject {
            println!("[{subject}]");
        }
        println!("{}", question.statement);
        for (i, option) in question.options.iter().enumerate() {
            let mark = if selected == Some(i) { "*" } else { " " };
            println!(" {mark} {}. {}", i + 1, option);
        }
        let options = question.options.len();

        if let Some(notice) = flow.notice().cloned() {
            println!("{}", describe(&notice));
            flow.clear_notice();
        }

        let Some(line) = prompt.ask("número para elegir, s siguiente, a anterior, q salir").await? else {
            return Ok(false);
        };
        let now = Instant::now();
        match line.as_str() {
            "q" => return Ok(false),
            "a" => flow.previous(now),
            "s" | "" => {
                let is_last = index + 1 == total;
                if is_last && !flow.can_submit() {
                    println!("Responde todas las preguntas antes de enviar.");
                }
                flow.next(now).await;
            }
            other => match other.parse::<usize>() {
                Ok(n) if (1..=options).contains(&n) => flow.select(n - 1, now),
                _ => println!("Opción no válida"),
            },
        }
    }
    Ok(true)
}

fn describe(notice: &FlowNotice) -> String {
    match notice {
        FlowNotice::LoginRequired => "Inicia sesión para continuar.".to_string(),
        FlowNotice::SessionExpired => "Tu sesión ha caducado. Vuelve a iniciar sesión.".to_string(),
        FlowNotice::NoQuestions => "No hay preguntas disponibles para hoy.".to_string(),
        FlowNotice::Error { message, .. } => message.clone(),
    }
}

fn print_results(view: &ResultsView) {
    let summary = &view.summary;
    println!(
        "\nResultado: {}/{} ({}%) · {:.0} puntos · {} s",
        summary.correct_count, summary.total_questions, summary.accuracy, summary.score, summary.total_time
    );
    match view.percentile {
        Some(percentile) => println!("Percentil: {percentile:.1}"),
        None => println!("Percentil: no disponible"),
    }
    if let Some(z) = view.z_score {
        println!("Puntuación z: {z:.2}");
    }
    if let Some(rank) = view.caller.rank {
        println!(
            "Tu posición: #{} {}",
            rank,
            view.caller.name.as_deref().unwrap_or_default()
        );
    }
    for row in &view.breakdown {
        println!("  {}: {}/{}", row.subject, row.correct, row.total);
    }
    for entry in view.ranking.iter().take(5) {
        println!(
            "  #{} {} {:.0}",
            entry.rank.unwrap_or_default(),
            entry.display_name.as_deref().unwrap_or("-"),
            entry.score.unwrap_or_default()
        );
    }
}

//=========================================================================================
// Notifications and Dashboard
//=========================================================================================

async fn run_notifications(
    api: &ApiClient,
    counter: &UnreadCounter,
    prompt: &mut Prompt,
) -> Result<(), AppError> {
    let feed = NotificationFeed::new(api.clone(), counter.clone());
    if let Err(e) = feed.reload().await {
        println!("{}", e.user_message());
    }

    loop {
        let state = feed.snapshot().await;
        println!();
        for (i, item) in state.items.iter().enumerate() {
            let mark = if item.unread { "●" } else { " " };
            println!("{mark} {}. {} {}", i + 1, item.title, item.body);
        }
        if state.items.is_empty() {
            println!("No hay notificaciones.");
        }
        let Some(line) = prompt
            .ask("número para marcar leída, t todas, f filtro, m más, q volver")
            .await?
        else {
            break;
        };
        let result = match line.as_str() {
            "q" => break,
            "t" => feed.mark_all_read().await,
            "m" => feed.load_more().await,
            "f" => {
                let filter = match state.filter {
                    NotificationFilter::All => NotificationFilter::Unread,
                    NotificationFilter::Unread => NotificationFilter::All,
                };
                feed.set_filter(filter).await;
                feed.settle().await;
                Ok(())
            }
            other => match other.parse::<usize>().ok().and_then(|n| state.items.get(n.wrapping_sub(1))) {
                Some(item) => feed.mark_read(&item.id).await,
                None => Ok(()),
            },
        };
        if let Err(e) = result {
            println!("{}", e.user_message());
        }
    }

    feed.teardown();
    Ok(())
}

async fn show_dashboard(dashboard: &Dashboard) {
    let view = dashboard.load().await;
    match &view.summary {
        Ok(summary) => println!(
            "\nQuizzes: {} · media {:.0} · mejor {:.0} · racha {}",
            summary.total_quizzes, summary.average_score, summary.best_score, summary.current_streak
        ),
        Err(message) => println!("\nResumen: {message}"),
    }
    match &view.timeseries {
        Ok(points) => {
            for point in points.iter().rev().take(7) {
                println!("  {} {:.0} ({:.0}%)", point.date, point.score, point.accuracy);
            }
        }
        Err(message) => println!("Evolución: {message}"),
    }
    if let Ok(days) = &view.heatmap {
        let active = days.iter().filter(|day| day.count > 0).count();
        println!("Días activos: {active}");
    }
    match &view.most_failed {
        Ok(Some(question)) => println!("Más fallada de la semana: {}", question.statement),
        Ok(None) => {}
        Err(message) => println!("Más fallada de la semana: {message}"),
    }
    dashboard.teardown();
}
