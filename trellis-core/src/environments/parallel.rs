//! Batch of environments stepped in parallel threads.
use super::batched::unstack_action;
use crate::{
    array::{Array, Stack},
    base::{Env, TimeStep},
    error::TrellisError,
    nest::Nest,
    spec::ArraySpec,
};
use anyhow::Result;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{info, trace, warn};
use serde::{Deserialize, Serialize};
use std::{marker::PhantomData, thread::JoinHandle};

/// Configuration of [`ParallelEnv`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelEnvConfig<C> {
    /// Configuration of each environment.
    pub env_config: C,

    /// Number of environments, each running in its own thread.
    pub n_envs: usize,
}

impl<C> ParallelEnvConfig<C> {
    /// Creates a configuration.
    pub fn new(env_config: C, n_envs: usize) -> Self {
        Self { env_config, n_envs }
    }

    /// Sets the number of environments.
    pub fn n_envs(mut self, n_envs: usize) -> Self {
        self.n_envs = n_envs;
        self
    }
}

enum Command {
    CurrentTimeStep,
    Reset,
    ResetWithIndex(usize),
    Step(Nest<Array>),
    Render,
    Close,
}

enum Response {
    TimeStep(TimeStep),
    Done,
}

type Specs = (Nest<ArraySpec>, Nest<ArraySpec>);

struct Worker {
    sender: Sender<Command>,
    receiver: Receiver<Result<Response>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Builds an environment in a new thread and waits for its specs.
    fn spawn<E>(id: usize, config: E::Config, seed: i64) -> Result<(Self, Specs)>
    where
        E: Env + 'static,
        E::Config: Send + 'static,
    {
        let (cmd_sender, cmd_receiver) = unbounded::<Command>();
        let (res_sender, res_receiver) = unbounded::<Result<Response>>();
        let (spec_sender, spec_receiver) = bounded::<Result<Specs>>(1);

        let handle = std::thread::spawn(move || {
            let mut env = match E::build(&config, seed) {
                Ok(env) => {
                    let _ = spec_sender.send(Ok((env.observation_spec(), env.action_spec())));
                    env
                }
                Err(e) => {
                    let _ = spec_sender.send(Err(e));
                    return;
                }
            };
            for cmd in cmd_receiver.iter() {
                let res = match cmd {
                    Command::CurrentTimeStep => env.current_time_step().map(Response::TimeStep),
                    Command::Reset => env.reset().map(Response::TimeStep),
                    Command::ResetWithIndex(ix) => env.reset_with_index(ix).map(Response::TimeStep),
                    Command::Step(action) => env.step(&action).map(Response::TimeStep),
                    Command::Render => env.render().map(|_| Response::Done),
                    Command::Close => break,
                };
                if res_sender.send(res).is_err() {
                    break;
                }
            }
            trace!("Environment worker {} exits", id);
        });

        let specs = spec_receiver
            .recv()
            .map_err(|_| TrellisError::WorkerDisconnected(id))??;
        let worker = Self {
            sender: cmd_sender,
            receiver: res_receiver,
            handle: Some(handle),
        };
        Ok((worker, specs))
    }
}

/// Presents a number of non-batched environments, each running in its own thread, as a
/// single batched environment.
///
/// Environments are built in their threads, so they need not be [`Send`]; only their
/// configuration is moved to the threads. A command is sent to every worker before any
/// result is awaited, so the environments step concurrently.
pub struct ParallelEnv<E: Env> {
    workers: Vec<Worker>,
    observation_spec: Nest<ArraySpec>,
    action_spec: Nest<ArraySpec>,
    phantom: PhantomData<fn() -> E>,
}

impl<E: Env> ParallelEnv<E> {
    fn broadcast(&self, commands: Vec<Command>) -> Result<Vec<Response>> {
        let sent = self
            .workers
            .iter()
            .zip(commands)
            .map(|(worker, cmd)| worker.sender.send(cmd).is_ok())
            .collect::<Vec<_>>();
        // Responses of every worker that got a command are received before errors are
        // propagated, so none is left behind for the next call.
        let responses = self
            .workers
            .iter()
            .zip(sent)
            .enumerate()
            .map(|(i, (worker, sent))| {
                if !sent {
                    return Err(TrellisError::WorkerDisconnected(i).into());
                }
                match worker.receiver.recv() {
                    Ok(res) => res,
                    Err(_) => Err(TrellisError::WorkerDisconnected(i).into()),
                }
            })
            .collect::<Vec<Result<Response>>>();
        responses.into_iter().collect()
    }

    fn broadcast_time_step(&self, commands: Vec<Command>) -> Result<TimeStep> {
        let time_steps = self
            .broadcast(commands)?
            .into_iter()
            .filter_map(|res| match res {
                Response::TimeStep(ts) => Some(ts),
                Response::Done => None,
            })
            .collect::<Vec<_>>();
        TimeStep::stack(&time_steps)
    }

    fn repeat(&self, f: impl Fn(usize) -> Command) -> Vec<Command> {
        (0..self.workers.len()).map(f).collect()
    }

    /// Stops the workers and waits for them.
    pub fn close(&mut self) {
        for worker in self.workers.iter() {
            let _ = worker.sender.send(Command::Close);
        }
        for (i, worker) in self.workers.iter_mut().enumerate() {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    warn!("Environment worker {} panicked", i);
                }
            }
        }
    }
}

impl<E> Env for ParallelEnv<E>
where
    E: Env + 'static,
    E::Config: Send + 'static,
{
    type Config = ParallelEnvConfig<E::Config>;
    type Info = ();

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        let mut workers = Vec::with_capacity(config.n_envs);
        let mut specs: Option<Specs> = None;
        for i in 0..config.n_envs {
            let (worker, s) = Worker::spawn::<E>(i, config.env_config.clone(), seed + i as i64)?;
            workers.push(worker);
            match &specs {
                None => specs = Some(s),
                Some(first) if *first != s => {
                    return Err(TrellisError::StructureMismatch(
                        "Parallel environments must have the same specs".into(),
                    )
                    .into())
                }
                _ => {}
            }
        }
        let (observation_spec, action_spec) = specs
            .ok_or_else(|| TrellisError::ShapeMismatch("No environment to run".into()))?;
        info!("Started {} environment workers", config.n_envs);
        Ok(Self {
            workers,
            observation_spec,
            action_spec,
            phantom: PhantomData,
        })
    }

    fn observation_spec(&self) -> Nest<ArraySpec> {
        self.observation_spec.clone()
    }

    fn action_spec(&self) -> Nest<ArraySpec> {
        self.action_spec.clone()
    }

    fn batched(&self) -> bool {
        true
    }

    fn batch_size(&self) -> Option<usize> {
        Some(self.workers.len())
    }

    fn current_time_step(&mut self) -> Result<TimeStep> {
        self.broadcast_time_step(self.repeat(|_| Command::CurrentTimeStep))
    }

    fn reset(&mut self) -> Result<TimeStep> {
        self.broadcast_time_step(self.repeat(|_| Command::Reset))
    }

    fn step(&mut self, action: &Nest<Array>) -> Result<TimeStep> {
        let actions = unstack_action(action, self.workers.len())?;
        self.broadcast_time_step(actions.into_iter().map(Command::Step).collect())
    }

    fn reset_with_index(&mut self, ix: usize) -> Result<TimeStep> {
        let n = self.workers.len();
        self.broadcast_time_step(self.repeat(|i| Command::ResetWithIndex(ix * n + i)))
    }

    fn render(&mut self) -> Result<()> {
        self.broadcast(self.repeat(|_| Command::Render)).map(|_| ())
    }
}

impl<E: Env> Drop for ParallelEnv<E> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::environments::{BatchedEnv, BatchedEnvConfig, CountingEnv, CountingEnvConfig};
    use test_log::test;

    #[test]
    fn test_matches_batched_env() -> Result<()> {
        let env_config = CountingEnvConfig::default().episode_length(3);
        let mut parallel =
            ParallelEnv::<CountingEnv>::build(&ParallelEnvConfig::new(env_config.clone(), 4), 7)?;
        let mut batched =
            BatchedEnv::<CountingEnv>::build(&BatchedEnvConfig::new(env_config, 4), 7)?;
        assert_eq!(parallel.observation_spec(), batched.observation_spec());
        assert_eq!(parallel.batch_size(), Some(4));

        assert_eq!(parallel.current_time_step()?, batched.current_time_step()?);
        for t in 0..8 {
            let action = Nest::Leaf(Array::vec_i64(vec![t % 2, 1, 0, 1]));
            assert_eq!(parallel.step(&action)?, batched.step(&action)?);
        }
        Ok(())
    }

    #[test]
    fn test_worker_error_propagates() -> Result<()> {
        let mut env = ParallelEnv::<CountingEnv>::build(
            &ParallelEnvConfig::new(CountingEnvConfig::default(), 2),
            0,
        )?;
        env.reset()?;
        // Actions must be scalars per environment.
        let action = Nest::tuple_of(vec![Array::vec_i64(vec![0, 1]), Array::vec_i64(vec![0, 1])]);
        assert!(env.step(&action).is_err());
        Ok(())
    }

    #[test]
    fn test_disconnected_worker_leaves_no_stale_response() -> Result<()> {
        let env_config = CountingEnvConfig::default().episode_length(5);
        let mut env = ParallelEnv::<CountingEnv>::build(&ParallelEnvConfig::new(env_config, 3), 0)?;
        assert!(env.reset()?.is_first());

        let (closed, _) = unbounded::<Command>();
        let sender = std::mem::replace(&mut env.workers[1].sender, closed);
        let action = Nest::Leaf(Array::vec_i64(vec![1, 1, 1]));
        let err = env.step(&action).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrellisError>(),
            Some(TrellisError::WorkerDisconnected(1))
        ));

        // Workers 0 and 2 stepped; their answers must not be mistaken for the reset below.
        env.workers[1].sender = sender;
        assert!(env.reset()?.is_first());
        assert!(env.step(&action)?.is_mid());
        Ok(())
    }
}
