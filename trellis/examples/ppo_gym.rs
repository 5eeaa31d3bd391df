use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::Path;
use trellis_core::{
    checkpoint::Checkpointer,
    environments::{GuardedEnv, ParallelEnv, ParallelEnvConfig},
    evaluator::{DefaultEvaluator, Evaluator},
    replay_buffer::{BatchedReplayBuffer, BatchedReplayBufferConfig},
    Agent, Env as _, Trainer, TrainerConfig,
};
use trellis_py_gym_env::{GymEnv, GymEnvConfig};
use trellis_tch_agent::ppo::{PpoAgent, PpoConfig};
use trellis_tensorboard::TensorboardRecorder;

type Env = GuardedEnv<ParallelEnv<GymEnv>>;
type EnvConfig = ParallelEnvConfig<GymEnvConfig>;

/// Train/eval PPO agent in a Gymnasium environment
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Name of the environment
    #[arg(long, default_value = "CartPole-v1")]
    env_name: String,

    /// Directory of checkpoints and summaries
    #[arg(long, default_value = "./trellis/examples/model/ppo_gym")]
    root_dir: String,

    /// Training ends after this number of environment steps
    #[arg(long, default_value_t = 25_000_000)]
    num_environment_steps: usize,

    /// Number of environments stepped in parallel
    #[arg(long, default_value_t = 30)]
    num_parallel_environments: usize,

    /// Number of optimization passes over each batch of experience
    #[arg(long, default_value_t = 25)]
    num_epochs: usize,

    /// Number of episodes collected in each iteration
    #[arg(long, default_value_t = 30)]
    collect_episodes_per_iteration: usize,

    /// Number of episodes run in each evaluation
    #[arg(long, default_value_t = 30)]
    num_eval_episodes: usize,

    /// Maximum number of steps stored per environment
    #[arg(long, default_value_t = 1001)]
    replay_buffer_capacity: usize,

    /// Evaluate the latest policy checkpoint, not train
    #[arg(long, default_value_t = false)]
    eval: bool,
}

fn env_config(args: &Args) -> EnvConfig {
    let gym = GymEnvConfig::default().name(args.env_name.as_str());
    ParallelEnvConfig::new(gym, args.num_parallel_environments)
}

fn build_agent(args: &Args, env: &Env) -> Result<PpoAgent> {
    let config = PpoConfig::default()
        .num_epochs(args.num_epochs)
        .use_gae(true)
        .learning_rate(1e-3)
        .entropy_regularization(0.0);
    PpoAgent::build(
        config,
        env.time_step_spec(),
        env.action_spec(),
        tch::Device::cuda_if_available(),
    )
}

fn train(args: &Args) -> Result<()> {
    let env_config = env_config(args);
    let mut env = Env::build(&env_config, 0)?;
    let mut agent = build_agent(args, &env)?;
    let mut buffer = BatchedReplayBuffer::build(
        &BatchedReplayBufferConfig::default()
            .batch_size(args.num_parallel_environments)
            .max_length(args.replay_buffer_capacity),
    );
    let mut evaluator = DefaultEvaluator::<Env>::new(&env_config, 1, args.num_eval_episodes)?;
    let mut recorder = TensorboardRecorder::new(Path::new(&args.root_dir).join("summaries"));
    let trainer_config = TrainerConfig::default()
        .num_environment_steps(args.num_environment_steps)
        .collect_episodes_per_iteration(args.collect_episodes_per_iteration)
        .num_eval_episodes(args.num_eval_episodes)
        .model_dir(args.root_dir.as_str());
    let mut trainer = Trainer::build(trainer_config);

    trainer.train(
        &mut agent,
        &mut env,
        &mut buffer,
        &mut evaluator,
        &mut recorder,
    )?;

    Ok(())
}

fn eval(args: &Args) -> Result<()> {
    let env_config = env_config(args);
    let env = Env::build(&env_config, 0)?;
    let mut agent = build_agent(args, &env)?;
    agent.initialize()?;

    let ckpt = Checkpointer::new(Path::new(&args.root_dir).join("policy"), 1);
    match ckpt.latest()? {
        Some((step, path)) => {
            agent.load_params(&path)?;
            info!("Loaded the policy at global step {}", step);
        }
        None => info!("No policy checkpoint in {:?}", ckpt.dir()),
    }

    let mut evaluator = DefaultEvaluator::from_env(env, args.num_eval_episodes);
    let record = evaluator.evaluate(agent.policy())?;
    for (k, v) in record.iter() {
        println!("{} = {:?}", k, v);
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    tch::manual_seed(42);

    let args = Args::parse();
    if args.eval {
        eval(&args)?;
    } else {
        train(&args)?;
    }

    Ok(())
}
