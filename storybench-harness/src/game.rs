//! Two-agent story finishing game. Agents alternate, each extending the
//! shared story by `c` tokens; every generation is bracketed by telemetry
//! scrapes so its latency can be read off the server.

use std::time::{Duration, Instant};
use storybench_client::{measure, InferenceClient, MetricsClient, DEFAULT_GRACE_PERIOD};
use storybench_common::{BenchError, Result, TurnRecord};
use tracing::{info, warn};

pub const AGENT_I: &str = "agent_i";
pub const AGENT_J: &str = "agent_j";

#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Inferences per turn. Recorded only; a turn is always one request.
    pub k: u32,
    /// Tokens requested per turn.
    pub c: u32,
    pub turns: u32,
    pub temperature: f64,
    pub grace: Duration,
}

impl GameConfig {
    pub fn new(k: u32, c: u32, turns: u32) -> Self {
        Self {
            k,
            c,
            turns,
            temperature: 0.7,
            grace: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// Everything a finished game produced.
#[derive(Debug, Clone)]
pub struct GameOutcome {
    /// Generated text of every turn, concatenated.
    pub full_story: String,
    /// Final shared context, with turns joined by spaces.
    pub context: String,
    pub records: Vec<TurnRecord>,
    pub elapsed: Duration,
}

/// A game stopped by a failed turn, with everything played before it.
#[derive(Debug, Clone)]
pub struct GameAborted {
    /// 1-based turn that failed.
    pub turn: u32,
    pub error: BenchError,
    pub partial: GameOutcome,
}

/// Odd turns belong to agent i, even turns to agent j.
pub fn agent_for_turn(turn: u32) -> &'static str {
    if turn % 2 == 1 {
        AGENT_I
    } else {
        AGENT_J
    }
}

pub fn build_prompt(c: u32, context: &str) -> String {
    format!(
        "We are playing a story finishing game. It is your turn. You are only allowed to give me \
         the next {c} tokens. You must give me exactly the next {c} tokens to finish the story. \
         The story starts as follows:\n\nOnce upon a time {context}"
    )
}

pub struct StoryGame<'a> {
    inference: &'a InferenceClient,
    metrics: &'a MetricsClient,
    config: GameConfig,
}

impl<'a> StoryGame<'a> {
    pub fn new(inference: &'a InferenceClient, metrics: &'a MetricsClient, config: GameConfig) -> Self {
        if config.k != config.c {
            warn!(k = config.k, c = config.c, "k differs from c; the baseline expects them equal");
        }
        Self { inference, metrics, config }
    }

    /// Play every turn in order. The first failed turn aborts the game; the
    /// turns completed before it are returned in [`GameAborted::partial`].
    pub async fn play(&self) -> std::result::Result<GameOutcome, GameAborted> {
        info!(turns = self.config.turns, k = self.config.k, c = self.config.c, "starting game");
        let start = Instant::now();
        let mut context = String::new();
        let mut full_story = String::new();
        let mut records = Vec::with_capacity(self.config.turns as usize);

        for turn in 1..=self.config.turns {
            let (text, record) = match self.take_turn(turn, &context).await {
                Ok(played) => played,
                Err(error) => {
                    warn!(turn, error = %error, completed = records.len(), "turn failed; aborting game");
                    return Err(GameAborted {
                        turn,
                        error,
                        partial: GameOutcome {
                            full_story,
                            context,
                            records,
                            elapsed: start.elapsed(),
                        },
                    });
                }
            };
            context.push(' ');
            context.push_str(&text);
            full_story.push_str(&text);
            records.push(record);
        }

        Ok(GameOutcome {
            full_story,
            context,
            records,
            elapsed: start.elapsed(),
        })
    }

    /// One agent turn: prompt with the current context and measure the request.
    pub async fn take_turn(&self, turn: u32, context: &str) -> Result<(String, TurnRecord)> {
        let agent = agent_for_turn(turn);
        let context_size = context.chars().count();
        let prompt = build_prompt(self.config.c, context);

        let measurement = measure(self.metrics, self.config.grace, || {
            self.inference.complete(&prompt, self.config.c, self.config.temperature)
        })
        .await?;
        let metrics = measurement.metrics();
        let completion = measurement.output;

        info!(
            turn,
            agent,
            context_size,
            tokens = completion.completion_tokens,
            ttft = metrics.ttft,
            tpot = metrics.tpot,
            window = ?metrics.window,
            "turn complete"
        );

        let record = TurnRecord {
            turn,
            agent: agent.to_string(),
            context_size,
            tokens_generated: completion.completion_tokens,
            metrics,
        };
        Ok((completion.text, record))
    }
}
