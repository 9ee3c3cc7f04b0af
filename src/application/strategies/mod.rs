mod oscillator;

pub use oscillator::OscillatorStrategy;
