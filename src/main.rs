use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Instant;

use mathtrainer_engine::config::EngineConfig;
use mathtrainer_engine::engine::assessment::AssessmentAnswer;
use mathtrainer_engine::engine::stats::StatsView;
use mathtrainer_engine::engine::types::SessionMode;
use mathtrainer_engine::engine::{PracticeEngine, SessionParams};
use mathtrainer_engine::error::EngineError;
use mathtrainer_engine::logging;
use mathtrainer_engine::store::ProfileStore;
use mathtrainer_engine::workers::WorkerManager;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _log_guard = logging::init_tracing(&log_level);

    let config = EngineConfig::from_env();
    let autosave_secs = config.autosave.interval_secs;
    let engine = Arc::new(PracticeEngine::new(config));

    let store = match ProfileStore::open_default() {
        Ok(store) => Arc::new(store),
        Err(err) => {
            eprintln!("cannot open profile store: {err}");
            std::process::exit(1);
        }
    };
    match load_profile(&engine, &store) {
        Ok(true) => {}
        Ok(false) => tracing::info!("no saved profile, starting fresh"),
        Err(err) => {
            eprintln!(
                "saved profile at {} could not be loaded: {err}",
                store.path().display()
            );
            std::process::exit(1);
        }
    }

    let command = std::env::args().nth(1).unwrap_or_else(|| "play".to_string());
    match command.as_str() {
        "play" => {
            let workers = WorkerManager::start(Arc::clone(&engine), Arc::clone(&store), autosave_secs);
            play(&engine);
            workers.stop().await;
        }
        "stats" => print_stats(&engine),
        "wipe" => {
            engine.wipe_all_data();
            if let Err(err) = store.save(&engine.snapshot()) {
                eprintln!("wipe saved in memory only: {err}");
            } else {
                println!("all data wiped");
            }
        }
        other => {
            eprintln!("unknown command {other:?}; expected play, stats, or wipe");
            std::process::exit(2);
        }
    }
}

/// Returns whether a saved profile was restored. Store failures surface
/// through the engine taxonomy so the caller reports one error kind.
fn load_profile(engine: &PracticeEngine, store: &ProfileStore) -> Result<bool, EngineError> {
    match store.load()? {
        Some(document) => {
            engine.restore(document)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn play(engine: &PracticeEngine) {
    if engine.profile().initial_assessment_score.is_none() {
        run_assessment(engine);
    }

    let settings = engine.settings();
    let start = match engine.start_session(SessionMode::Normal, SessionParams::default()) {
        Ok(start) => start,
        Err(err) => {
            eprintln!("cannot start session: {err}");
            return;
        }
    };
    println!(
        "Session {} started ({}s). Answer with a number, 'h' for a hint, 'q' to stop.",
        start.session_id, settings.game_duration_sec
    );

    let stdin = std::io::stdin();
    let deadline = Instant::now() + std::time::Duration::from_secs(settings.game_duration_sec as u64);
    'outer: while Instant::now() < deadline {
        let question = match engine.next_question() {
            Ok(question) => question,
            Err(EngineError::QueueExhausted) => break,
            Err(err) => {
                eprintln!("{err}");
                break;
            }
        };
        println!("{}", question.prompt);
        if let Some(choices) = &question.choices {
            for (i, choice) in choices.iter().enumerate() {
                println!("  {}) {}", i + 1, choice);
            }
        }

        let issued = Instant::now();
        loop {
            print!("> ");
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break 'outer,
                Ok(_) => {}
                Err(_) => break 'outer,
            }
            match line.trim() {
                "q" => break 'outer,
                "h" => {
                    if let Ok(hint) = engine.hint() {
                        println!("hint: {hint}");
                    }
                    continue;
                }
                answer => {
                    let Ok(value) = answer.parse::<f64>() else {
                        println!("enter a number, 'h', or 'q'");
                        continue;
                    };
                    let rt_ms = issued.elapsed().as_millis().max(1) as i64;
                    match engine.submit_answer_timed(value, rt_ms) {
                        Ok(outcome) => {
                            if outcome.correct {
                                println!("correct (+{} xp)", outcome.xp_awarded);
                            } else {
                                println!("wrong, answer was {}", outcome.correct_answer);
                            }
                            if outcome.leveled_up {
                                println!("*** level {} ***", outcome.new_level);
                            }
                        }
                        Err(err) => eprintln!("{err}"),
                    }
                    break;
                }
            }
        }
    }

    match engine.end_session() {
        Ok(summary) => {
            let profile = engine.profile();
            println!(
                "Session over: {:.0}% correct, {:.0}ms average. Level {} ({} / {} xp).",
                summary.accuracy * 100.0,
                summary.avg_time_ms,
                profile.level,
                profile.xp,
                profile.xp_to_next
            );
        }
        Err(err) => eprintln!("{err}"),
    }
}

fn run_assessment(engine: &PracticeEngine) {
    let questions = match engine.request_assessment() {
        Ok(questions) => questions,
        Err(_) => return,
    };
    println!("First run: a short calibration round ({} questions).", questions.len());

    let stdin = std::io::stdin();
    let mut answers = Vec::with_capacity(questions.len());
    for question in &questions {
        println!("{}", question.prompt);
        print!("> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        let issued = Instant::now();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let value = line.trim().parse::<f64>().unwrap_or(f64::NAN);
        answers.push(AssessmentAnswer {
            question_id: question.id.clone(),
            value,
            response_time_ms: issued.elapsed().as_millis().max(1) as i64,
        });
    }
    match engine.complete_assessment(&answers) {
        Ok(score) => println!("Calibration done: {:.0}% correct.", score * 100.0),
        Err(err) => eprintln!("calibration failed: {err}"),
    }
}

fn print_stats(engine: &PracticeEngine) {
    for view in [StatsView::Overview, StatsView::Operations, StatsView::Sessions] {
        match serde_json::to_string_pretty(&engine.get_stats(view)) {
            Ok(json) => println!("{json}"),
            Err(err) => eprintln!("{err}"),
        }
    }
    match serde_json::to_string_pretty(&engine.get_prediction(None)) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("{err}"),
    }
}
