//! Dense statevector with measurement collapse.

use num_complex::Complex64;
use rand::Rng;
use std::f64::consts::PI;

use crate::error::{SimError, SimResult};

/// Largest register the dense representation will allocate (2^26 amplitudes
/// is one gigabyte of complex doubles).
pub const MAX_QUBITS: usize = 26;

/// A quantum state over `n` qubits, 2^n complex amplitudes.
///
/// Gates are dispatched by wire name so the engine can apply instructions
/// straight off a task without an intermediate gate enum.
pub struct Statevector {
    amplitudes: Vec<Complex64>,
    num_qubits: usize,
}

impl Statevector {
    /// Create a statevector initialised to |0...0⟩.
    pub fn new(num_qubits: usize) -> SimResult<Self> {
        if num_qubits > MAX_QUBITS {
            return Err(SimError::TooManyQubits {
                requested: num_qubits,
                max: MAX_QUBITS,
            });
        }
        let size = 1usize << num_qubits.max(1);
        let mut amplitudes = vec![Complex64::new(0.0, 0.0); size];
        amplitudes[0] = Complex64::new(1.0, 0.0);
        Ok(Self {
            amplitudes,
            num_qubits: num_qubits.max(1),
        })
    }

    /// Number of qubits in the register.
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Apply a named gate.
    pub fn apply_gate(
        &mut self,
        name: &str,
        qubits: &[usize],
        params: Option<&[f64]>,
    ) -> SimResult<()> {
        let Some(expected) = operand_count(name) else {
            return Err(SimError::UnsupportedGate(name.to_string()));
        };
        if qubits.len() < expected {
            return Err(SimError::MissingOperands {
                gate: name.to_string(),
                expected,
                got: qubits.len(),
            });
        }
        for &qubit in qubits {
            if qubit >= self.num_qubits {
                return Err(SimError::QubitOutOfRange {
                    qubit,
                    num_qubits: self.num_qubits,
                });
            }
        }
        let p = |index: usize, gate: &'static str, expected: usize| -> SimResult<f64> {
            params
                .and_then(|values| values.get(index))
                .copied()
                .ok_or(SimError::MissingParams { gate, expected })
        };

        match name {
            "id" | "barrier" | "delay" => {}
            "x" => self.apply_x(qubits[0]),
            "y" => self.apply_y(qubits[0]),
            "z" => self.apply_z(qubits[0]),
            "h" => self.apply_h(qubits[0]),
            "s" => self.apply_phase(qubits[0], PI / 2.0),
            "sdg" => self.apply_phase(qubits[0], -PI / 2.0),
            "t" => self.apply_phase(qubits[0], PI / 4.0),
            "tdg" => self.apply_phase(qubits[0], -PI / 4.0),
            "sx" => self.apply_rx(qubits[0], PI / 2.0),
            "sxdg" => self.apply_rx(qubits[0], -PI / 2.0),
            "p" => {
                let theta = p(0, "p", 1)?;
                self.apply_phase(qubits[0], theta);
            }
            "rx" => {
                let theta = p(0, "rx", 1)?;
                self.apply_rx(qubits[0], theta);
            }
            "ry" => {
                let theta = p(0, "ry", 1)?;
                self.apply_ry(qubits[0], theta);
            }
            "rz" => {
                let theta = p(0, "rz", 1)?;
                self.apply_rz(qubits[0], theta);
            }
            "r" => {
                let theta = p(0, "r", 2)?;
                let phi = p(1, "r", 2)?;
                self.apply_r(qubits[0], theta, phi);
            }
            "u" => {
                let theta = p(0, "u", 3)?;
                let phi = p(1, "u", 3)?;
                let lambda = p(2, "u", 3)?;
                self.apply_u(qubits[0], theta, phi, lambda);
            }
            "cx" => self.apply_cx(qubits[0], qubits[1]),
            "cy" => self.apply_cy(qubits[0], qubits[1]),
            "cz" => self.apply_cz(qubits[0], qubits[1]),
            "ch" => self.apply_ch(qubits[0], qubits[1]),
            "cu" => {
                let theta = p(0, "cu", 3)?;
                let phi = p(1, "cu", 3)?;
                let lambda = p(2, "cu", 3)?;
                self.apply_cu(qubits[0], qubits[1], theta, phi, lambda);
            }
            "swap" => self.apply_swap(qubits[0], qubits[1]),
            "ccx" => self.apply_ccx(qubits[0], qubits[1], qubits[2]),
            other => return Err(SimError::UnsupportedGate(other.to_string())),
        }
        Ok(())
    }

    /// Measure one qubit, collapsing the state.
    pub fn measure(&mut self, qubit: usize, rng: &mut impl Rng) -> SimResult<u8> {
        if qubit >= self.num_qubits {
            return Err(SimError::QubitOutOfRange {
                qubit,
                num_qubits: self.num_qubits,
            });
        }
        let mask = 1usize << qubit;
        let p_one: f64 = self
            .amplitudes
            .iter()
            .enumerate()
            .filter(|(index, _)| index & mask != 0)
            .map(|(_, amp)| amp.norm_sqr())
            .sum();

        let outcome = u8::from(rng.gen::<f64>() < p_one);
        self.project(qubit, outcome);
        Ok(outcome)
    }

    /// Reset one qubit to |0⟩ (measure, then flip if it came out 1).
    pub fn reset(&mut self, qubit: usize, rng: &mut impl Rng) -> SimResult<()> {
        if self.measure(qubit, rng)? == 1 {
            self.apply_x(qubit);
        }
        Ok(())
    }

    /// Project onto `qubit = outcome` and renormalise.
    fn project(&mut self, qubit: usize, outcome: u8) {
        let mask = 1usize << qubit;
        let keep_set = outcome == 1;
        let mut norm_sq = 0.0;
        for (index, amp) in self.amplitudes.iter_mut().enumerate() {
            if ((index & mask) != 0) != keep_set {
                *amp = Complex64::new(0.0, 0.0);
            } else {
                norm_sq += amp.norm_sqr();
            }
        }
        let norm = norm_sq.sqrt();
        if norm > 0.0 {
            for amp in &mut self.amplitudes {
                *amp /= norm;
            }
        }
    }

    fn apply_x(&mut self, qubit: usize) {
        let mask = 1usize << qubit;
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                self.amplitudes.swap(i, i | mask);
            }
        }
    }

    fn apply_y(&mut self, qubit: usize) {
        let mask = 1usize << qubit;
        let i_val = Complex64::new(0.0, 1.0);
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                let j = i | mask;
                let tmp = self.amplitudes[i];
                self.amplitudes[i] = -i_val * self.amplitudes[j];
                self.amplitudes[j] = i_val * tmp;
            }
        }
    }

    fn apply_z(&mut self, qubit: usize) {
        let mask = 1usize << qubit;
        for i in 0..self.amplitudes.len() {
            if i & mask != 0 {
                self.amplitudes[i] = -self.amplitudes[i];
            }
        }
    }

    fn apply_h(&mut self, qubit: usize) {
        let mask = 1usize << qubit;
        let sqrt2_inv = 1.0 / 2.0_f64.sqrt();
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = sqrt2_inv * (a + b);
                self.amplitudes[j] = sqrt2_inv * (a - b);
            }
        }
    }

    fn apply_phase(&mut self, qubit: usize, theta: f64) {
        let mask = 1usize << qubit;
        let phase = Complex64::from_polar(1.0, theta);
        for i in 0..self.amplitudes.len() {
            if i & mask != 0 {
                self.amplitudes[i] *= phase;
            }
        }
    }

    fn apply_rx(&mut self, qubit: usize, theta: f64) {
        let mask = 1usize << qubit;
        let c = (theta / 2.0).cos();
        let neg_i_s = Complex64::new(0.0, -(theta / 2.0).sin());
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = c * a + neg_i_s * b;
                self.amplitudes[j] = neg_i_s * a + c * b;
            }
        }
    }

    fn apply_ry(&mut self, qubit: usize, theta: f64) {
        let mask = 1usize << qubit;
        let c = (theta / 2.0).cos();
        let s = (theta / 2.0).sin();
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = c * a - s * b;
                self.amplitudes[j] = s * a + c * b;
            }
        }
    }

    fn apply_rz(&mut self, qubit: usize, theta: f64) {
        let mask = 1usize << qubit;
        let phase_0 = Complex64::from_polar(1.0, -theta / 2.0);
        let phase_1 = Complex64::from_polar(1.0, theta / 2.0);
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                self.amplitudes[i] *= phase_0;
            } else {
                self.amplitudes[i] *= phase_1;
            }
        }
    }

    /// R(θ, φ): rotation by θ around the axis cos(φ)X + sin(φ)Y.
    fn apply_r(&mut self, qubit: usize, theta: f64, phi: f64) {
        let mask = 1usize << qubit;
        let c = (theta / 2.0).cos();
        let s = (theta / 2.0).sin();
        let off_01 = Complex64::new(0.0, -s) * Complex64::from_polar(1.0, -phi);
        let off_10 = Complex64::new(0.0, -s) * Complex64::from_polar(1.0, phi);
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = c * a + off_01 * b;
                self.amplitudes[j] = off_10 * a + c * b;
            }
        }
    }

    fn apply_u(&mut self, qubit: usize, theta: f64, phi: f64, lambda: f64) {
        let mask = 1usize << qubit;
        let c = (theta / 2.0).cos();
        let s = (theta / 2.0).sin();
        let e_il = Complex64::from_polar(1.0, lambda);
        let e_ip = Complex64::from_polar(1.0, phi);
        let e_ipl = Complex64::from_polar(1.0, phi + lambda);
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = c * a - e_il * s * b;
                self.amplitudes[j] = e_ip * s * a + e_ipl * c * b;
            }
        }
    }

    fn apply_cx(&mut self, control: usize, target: usize) {
        let ctrl_mask = 1usize << control;
        let tgt_mask = 1usize << target;
        for i in 0..self.amplitudes.len() {
            if (i & ctrl_mask != 0) && (i & tgt_mask == 0) {
                self.amplitudes.swap(i, i | tgt_mask);
            }
        }
    }

    fn apply_cy(&mut self, control: usize, target: usize) {
        let ctrl_mask = 1usize << control;
        let tgt_mask = 1usize << target;
        let i_val = Complex64::new(0.0, 1.0);
        for i in 0..self.amplitudes.len() {
            if (i & ctrl_mask != 0) && (i & tgt_mask == 0) {
                let j = i | tgt_mask;
                let tmp = self.amplitudes[i];
                self.amplitudes[i] = -i_val * self.amplitudes[j];
                self.amplitudes[j] = i_val * tmp;
            }
        }
    }

    fn apply_cz(&mut self, control: usize, target: usize) {
        let ctrl_mask = 1usize << control;
        let tgt_mask = 1usize << target;
        for i in 0..self.amplitudes.len() {
            if (i & ctrl_mask != 0) && (i & tgt_mask != 0) {
                self.amplitudes[i] = -self.amplitudes[i];
            }
        }
    }

    fn apply_ch(&mut self, control: usize, target: usize) {
        let ctrl_mask = 1usize << control;
        let tgt_mask = 1usize << target;
        let sqrt2_inv = 1.0 / 2.0_f64.sqrt();
        for i in 0..self.amplitudes.len() {
            if (i & ctrl_mask != 0) && (i & tgt_mask == 0) {
                let j = i | tgt_mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = sqrt2_inv * (a + b);
                self.amplitudes[j] = sqrt2_inv * (a - b);
            }
        }
    }

    fn apply_cu(&mut self, control: usize, target: usize, theta: f64, phi: f64, lambda: f64) {
        let ctrl_mask = 1usize << control;
        let tgt_mask = 1usize << target;
        let c = (theta / 2.0).cos();
        let s = (theta / 2.0).sin();
        let e_il = Complex64::from_polar(1.0, lambda);
        let e_ip = Complex64::from_polar(1.0, phi);
        let e_ipl = Complex64::from_polar(1.0, phi + lambda);
        for i in 0..self.amplitudes.len() {
            if (i & ctrl_mask != 0) && (i & tgt_mask == 0) {
                let j = i | tgt_mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = c * a - e_il * s * b;
                self.amplitudes[j] = e_ip * s * a + e_ipl * c * b;
            }
        }
    }

    fn apply_swap(&mut self, q1: usize, q2: usize) {
        let mask1 = 1usize << q1;
        let mask2 = 1usize << q2;
        for i in 0..self.amplitudes.len() {
            if (i & mask1 != 0) && (i & mask2 == 0) {
                self.amplitudes.swap(i, (i & !mask1) | mask2);
            }
        }
    }

    fn apply_ccx(&mut self, c1: usize, c2: usize, target: usize) {
        let c1_mask = 1usize << c1;
        let c2_mask = 1usize << c2;
        let tgt_mask = 1usize << target;
        for i in 0..self.amplitudes.len() {
            if (i & c1_mask != 0) && (i & c2_mask != 0) && (i & tgt_mask == 0) {
                self.amplitudes.swap(i, i | tgt_mask);
            }
        }
    }

    #[cfg(test)]
    fn amplitude(&self, index: usize) -> Complex64 {
        self.amplitudes[index]
    }
}

/// Qubit operands a gate consumes, or `None` for an unknown gate.
fn operand_count(name: &str) -> Option<usize> {
    Some(match name {
        "id" | "barrier" | "delay" => 0,
        "x" | "y" | "z" | "h" | "s" | "sdg" | "t" | "tdg" | "sx" | "sxdg" | "p" | "rx" | "ry"
        | "rz" | "r" | "u" => 1,
        "cx" | "cy" | "cz" | "ch" | "cu" | "swap" => 2,
        "ccx" => 3,
        _ => return None,
    })
}
