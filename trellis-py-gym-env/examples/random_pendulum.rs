use anyhow::Result;
use trellis_core::{
    drivers::DynamicStepDriver,
    metrics::{EnvironmentSteps, Metric},
    policies::RandomPolicy,
    Env, Observer,
};
use trellis_py_gym_env::{GymEnv, GymEnvConfig};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = GymEnvConfig::default()
        .name("Pendulum-v1")
        .render_mode(Some("human".to_string()))
        .max_steps(Some(100));
    let mut env = GymEnv::build(&config, 42)?;
    let mut policy = RandomPolicy::new(env.time_step_spec(), env.action_spec(), 42);
    let mut steps = EnvironmentSteps::new();

    let observers = vec![&mut steps as &mut dyn Observer];
    let mut driver = DynamicStepDriver::new(&mut env, &mut policy, observers, 300);
    driver.run(None, None)?;
    println!("{} = {}", steps.name(), steps.result());

    if let Some(info) = env.get_info() {
        println!("Last info = {:?}", info);
    }
    Ok(())
}
