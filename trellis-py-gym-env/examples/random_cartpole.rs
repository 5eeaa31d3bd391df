use anyhow::Result;
use trellis_core::{
    drivers::DynamicEpisodeDriver,
    metrics::{AverageEpisodeLengthMetric, AverageReturnMetric, Metric},
    policies::RandomPolicy,
    Env, Observer,
};
use trellis_py_gym_env::{GymEnv, GymEnvConfig};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = GymEnvConfig::default().name("CartPole-v1");
    let mut env = GymEnv::build(&config, 42)?;
    let mut policy = RandomPolicy::new(env.time_step_spec(), env.action_spec(), 42);
    let mut average_return = AverageReturnMetric::new(10);
    let mut average_length = AverageEpisodeLengthMetric::new(10);

    let mut driver = DynamicEpisodeDriver::new(
        &mut env,
        &mut policy,
        vec![&mut average_return as &mut dyn Observer, &mut average_length],
        5,
    );
    driver.run(None, None, None)?;

    println!("{} = {}", average_return.name(), average_return.result());
    println!("{} = {}", average_length.name(), average_length.result());
    Ok(())
}
