//! Defines the Component trait, used by each stage of the host pipeline.
//! Every stage consumes data from the stage before it, processes it, and
//! passes zero or more results on to the next stage, each on its own thread
//! between mpsc channels.

use crate::config::ProtocolConfig;
use crate::decoder::{DecodedFrame, FormatError, FrameDecoder};
use crate::quantize::DegenerateRange;
use crate::reassembler::FrameReassembler;

use log::{debug, info, warn};
use std::fmt;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

/// Things that can go wrong while a stage shuts down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    /// The link closed in the middle of a frame, these bytes were dropped.
    TrailingBytes(usize),
    /// The next stage went away before this one was done.
    Disconnected,
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ComponentError::TrailingBytes(n) => {
                write!(f, "{} bytes of an unfinished frame were dropped", n)
            }
            ComponentError::Disconnected => write!(f, "downstream stage hung up"),
        }
    }
}

impl std::error::Error for ComponentError {}

///
/// A stage of the host pipeline. Link bytes go in one end and decoded grids
/// come out of the other; every struct doing one step of that must implement
/// Component so it can be chained with the others.
///
pub trait Component: ToString {
    /// What the stage consumes
    type InData;
    /// What the stage produces
    type OutData;

    /// Converts one input into however many outputs it completes
    fn convert(&mut self, input: Self::InData) -> Vec<Self::OutData>;

    /// Cleans up at termination of pipeline
    fn finalize(&mut self) -> Result<(), ComponentError>;
}

/// Runs the given Component on its own thread. On receiving InData on the
/// input channel, the Component converts it and sends every resulting
/// OutData to the output channel. The thread ends when the input channel
/// closes or the output channel has nobody left to read it.
pub fn run_component<C: Component + Send + 'static>(
    mut component: Box<C>,
    input: Receiver<<C as Component>::InData>,
    output: Sender<<C as Component>::OutData>,
) -> JoinHandle<Result<(), ComponentError>>
where
    <C as Component>::InData: Send + 'static,
    <C as Component>::OutData: Send + 'static,
{
    thread::spawn(move || {
        let mut result = Ok(());
        'recv: while let Ok(data) = input.recv() {
            for out_data in component.convert(data) {
                if output.send(out_data).is_err() {
                    warn!("{} : output channel closed.", component.to_string());
                    result = Err(ComponentError::Disconnected);
                    break 'recv;
                }
            }
        }

        if let Err(component_error) = component.finalize() {
            warn!(
                "{} : error during terminating : {}.",
                component.to_string(),
                component_error
            );
            result = result.and(Err(component_error));
        }
        info!("{} : terminated.", component.to_string());
        result
    })
}

/// Turns link fragments into whole frames.
pub struct ReassemblyStage {
    reassembler: FrameReassembler,
}

impl ReassemblyStage {
    /// A stage for `protocol`'s frame layout.
    pub fn new(protocol: &ProtocolConfig) -> Self {
        Self {
            reassembler: FrameReassembler::new(protocol),
        }
    }
}

impl Component for ReassemblyStage {
    type InData = Vec<u8>;
    type OutData = Vec<u8>;

    fn convert(&mut self, input: Vec<u8>) -> Vec<Vec<u8>> {
        self.reassembler.push(&input)
    }

    fn finalize(&mut self) -> Result<(), ComponentError> {
        let stats = self.reassembler.stats();
        debug!("{} : {:?}", self.to_string(), stats);
        match self.reassembler.pending() {
            0 => Ok(()),
            n => Err(ComponentError::TrailingBytes(n)),
        }
    }
}

impl ToString for ReassemblyStage {
    fn to_string(&self) -> String {
        "ReassemblyStage".to_string()
    }
}

/// Turns frames into grids. Bad frames are passed on as errors, so the
/// consumer decides what to do with them.
pub struct DecodeStage {
    decoder: FrameDecoder,
    rejected: u64,
}

impl DecodeStage {
    /// A stage for `protocol`'s frame layout.
    pub fn new(protocol: &ProtocolConfig) -> Result<Self, DegenerateRange> {
        Ok(Self {
            decoder: FrameDecoder::new(protocol)?,
            rejected: 0,
        })
    }
}

impl Component for DecodeStage {
    type InData = Vec<u8>;
    type OutData = Result<DecodedFrame, FormatError>;

    fn convert(&mut self, input: Vec<u8>) -> Vec<Self::OutData> {
        let decoded = self.decoder.decode(&input);
        if let Err(e) = &decoded {
            self.rejected += 1;
            warn!("{} : dropping frame, {}", self.to_string(), e);
        }
        vec![decoded]
    }

    fn finalize(&mut self) -> Result<(), ComponentError> {
        if self.rejected > 0 {
            info!("{} : {} frames rejected", self.to_string(), self.rejected);
        }
        Ok(())
    }
}

impl ToString for DecodeStage {
    fn to_string(&self) -> String {
        "DecodeStage".to_string()
    }
}

/// The reassemble-then-decode chain on two threads. Returns the receiving
/// end of the decoded frames and both join handles.
pub fn spawn_host_pipeline(
    protocol: &ProtocolConfig,
    fragments: Receiver<Vec<u8>>,
) -> Result<
    (
        Receiver<Result<DecodedFrame, FormatError>>,
        Vec<JoinHandle<Result<(), ComponentError>>>,
    ),
    DegenerateRange,
> {
    let decode = DecodeStage::new(protocol)?;
    let reassemble = ReassemblyStage::new(protocol);

    let (frame_tx, frame_rx) = std::sync::mpsc::channel();
    let (decoded_tx, decoded_rx) = std::sync::mpsc::channel();
    let handles = vec![
        run_component(Box::new(reassemble), fragments, frame_tx),
        run_component(Box::new(decode), frame_rx, decoded_tx),
    ];
    Ok((decoded_rx, handles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunker;
    use crate::frame::FrameEncoder;
    use crate::grid::{Grid, Reading};
    use std::sync::mpsc::channel;

    /// Adds one, and says nothing for negative numbers
    struct MockComponent {}

    impl MockComponent {
        fn new() -> Self {
            Self {}
        }
    }

    impl Component for MockComponent {
        type InData = i32;
        type OutData = i32;

        fn convert(&mut self, input: i32) -> Vec<i32> {
            if input < 0 {
                vec![]
            } else {
                vec![input + 1]
            }
        }

        fn finalize(&mut self) -> Result<(), ComponentError> {
            Ok(())
        }
    }

    impl ToString for MockComponent {
        fn to_string(&self) -> String {
            "MockComponent".to_string()
        }
    }

    /// Checks that writing a value to the Component's input produces that
    /// value, converted, in the Component's output
    #[test]
    fn test_mock_component() {
        let (test_tx, block_rx) = channel::<i32>();
        let (block_tx, test_rx) = channel::<i32>();

        let handle = run_component(Box::new(MockComponent::new()), block_rx, block_tx);

        assert_eq!(test_tx.send(-5), Ok(()));
        assert_eq!(test_tx.send(0), Ok(()));
        assert_eq!(test_rx.recv(), Ok(1));
        drop(test_tx);
        assert_eq!(handle.join().unwrap(), Ok(()));
    }

    #[test]
    fn test_chained_component() {
        let (test_tx, block_a_rx) = channel::<i32>();
        let (block_a_tx, block_b_rx) = channel::<i32>();
        let (block_b_tx, test_rx) = channel::<i32>();

        run_component(Box::new(MockComponent::new()), block_a_rx, block_a_tx);
        run_component(Box::new(MockComponent::new()), block_b_rx, block_b_tx);

        assert_eq!(test_tx.send(0), Ok(()));
        assert_eq!(test_rx.recv(), Ok(2));
    }

    #[test]
    fn hung_up_output_reports_disconnected() {
        let (test_tx, block_rx) = channel::<i32>();
        let (block_tx, test_rx) = channel::<i32>();
        drop(test_rx);

        let handle = run_component(Box::new(MockComponent::new()), block_rx, block_tx);
        test_tx.send(1).unwrap();
        assert_eq!(handle.join().unwrap(), Err(ComponentError::Disconnected));
    }

    fn protocol() -> ProtocolConfig {
        ProtocolConfig {
            rows: 2,
            cols: 2,
            omitted: vec![(1, 1)],
            mtu: 5,
            ..ProtocolConfig::default()
        }
    }

    #[test]
    fn fragments_in_grids_out() {
        let protocol = protocol();
        let mut encoder = FrameEncoder::new(&protocol).unwrap();
        let mut chunker = Chunker::new(&protocol);
        let mut grid = Grid::filled(2, 2, Reading::Sensed(3700.0));
        grid.set(1, 1, Reading::NoData);

        let (tx, rx) = channel();
        let (decoded, handles) = spawn_host_pipeline(&protocol, rx).unwrap();
        for _ in 0..3 {
            for fragment in chunker.split(&encoder.encode(&grid).unwrap()) {
                tx.send(fragment).unwrap();
            }
        }
        drop(tx);

        let frames: Vec<DecodedFrame> = decoded.iter().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames.iter().map(|f| f.frame_id).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(frames.iter().all(|f| f.grid.get(1, 1) == Reading::NoData));
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Ok(()));
        }
    }

    #[test]
    fn unfinished_frame_is_reported_on_shutdown() {
        let protocol = protocol();
        let mut encoder = FrameEncoder::new(&protocol).unwrap();
        let bytes = encoder.encode(&Grid::filled(2, 2, Reading::Sensed(10.0))).unwrap();

        let mut stage = ReassemblyStage::new(&protocol);
        assert!(stage.convert(bytes[..7].to_vec()).is_empty());
        assert_eq!(stage.finalize(), Err(ComponentError::TrailingBytes(7)));
    }

    #[test]
    fn decode_stage_passes_errors_on() {
        let mut stage = DecodeStage::new(&protocol()).unwrap();
        let out = stage.convert(vec![0xEF, 0xBE]);
        assert!(matches!(out.as_slice(), [Err(FormatError::Length { .. })]));
        assert_eq!(stage.finalize(), Ok(()));
    }
}
