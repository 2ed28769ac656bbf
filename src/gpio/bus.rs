use super::Pin;

/// Bits to drive on one port for a bus value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PortBits {
	pub port: u8,
	pub mask: u32,
	pub value: u32,
}

/// Placement of the eight data lines (DATA0 = LSB first) on host ports.
///
/// The lines don't need to be contiguous or on the same port; `scatter` and
/// `gather` translate between the logical byte and per-port bitfields.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BusLayout {
	lines: [Pin; 8],
}

impl BusLayout {
	pub fn new(lines: [Pin; 8]) -> Self {
		BusLayout { lines }
	}

	/// DATA0..7 on bits `first_bit..first_bit + 8` of `port`
	pub fn contiguous(port: u8, first_bit: u8) -> Self {
		let mut lines = [Pin::new(port, first_bit); 8];
		for (i, line) in lines.iter_mut().enumerate() {
			line.bit = first_bit + i as u8;
		}
		BusLayout { lines }
	}

	pub fn lines(&self) -> &[Pin; 8] {
		&self.lines
	}

	/// Ports touched by the bus, with all bus bits in `mask` (ordered by port).
	pub fn ports(&self) -> Vec<PortBits> {
		self.scatter(0)
	}

	/// Split a logical bus byte into the bitfields of each port.
	pub fn scatter(&self, byte: u8) -> Vec<PortBits> {
		let mut result: Vec<PortBits> = Vec::new();
		for (bit, pin) in self.lines.iter().enumerate() {
			let value = if 0 != byte & (1 << bit) { pin.mask() } else { 0 };
			match result.iter_mut().find(|p| p.port == pin.port) {
				Some(p) => {
					p.mask |= pin.mask();
					p.value |= value;
				},
				None => result.push(PortBits {
					port: pin.port,
					mask: pin.mask(),
					value,
				}),
			}
		}
		result.sort();
		result
	}

	/// Assemble the logical bus byte; `read_port` is called once per port.
	pub fn gather<F>(&self, mut read_port: F) -> u8
	where
		F: FnMut(u8) -> u32,
	{
		let mut byte = 0u8;
		for port in self.ports() {
			let input = read_port(port.port);
			for (bit, pin) in self.lines.iter().enumerate() {
				if pin.port == port.port && 0 != input & pin.mask() {
					byte |= 1 << bit;
				}
			}
		}
		byte
	}
}

#[cfg(test)]
mod test {
	use super::*;

	// digital lines 0-7 of a board whose "port D" is spread over three ports:
	// PE0 PE1 PE4 PE5 PG5 PE3 PH3 PH4
	const E: u8 = 4;
	const G: u8 = 6;
	const H: u8 = 7;

	fn scattered() -> BusLayout {
		BusLayout::new([
			Pin::new(E, 0), Pin::new(E, 1), Pin::new(E, 4), Pin::new(E, 5),
			Pin::new(G, 5), Pin::new(E, 3), Pin::new(H, 3), Pin::new(H, 4),
		])
	}

	fn read_from(bits: &[PortBits]) -> impl FnMut(u8) -> u32 + '_ {
		move |port| bits.iter().filter(|p| p.port == port).map(|p| p.value).sum()
	}

	#[test]
	fn contiguous_is_shifted_byte() {
		let bus = BusLayout::contiguous(0, 16);
		assert_eq!(bus.scatter(0xa5), vec![PortBits { port: 0, mask: 0x00ff_0000, value: 0x00a5_0000 }]);
		assert_eq!(bus.gather(|_| 0x00a5_0000), 0xa5);
		// bits outside the bus are ignored
		assert_eq!(bus.gather(|_| 0xff00_ffff), 0x00);
	}

	#[test]
	fn scattered_port_bitfields() {
		let bus = scattered();
		assert_eq!(bus.ports(), vec![
			PortBits { port: E, mask: 0b0011_1011, value: 0 },
			PortBits { port: G, mask: 0b0010_0000, value: 0 },
			PortBits { port: H, mask: 0b0001_1000, value: 0 },
		]);
		// 0xa5: DATA0, DATA2, DATA5, DATA7
		assert_eq!(bus.scatter(0xa5), vec![
			PortBits { port: E, mask: 0b0011_1011, value: 0b0001_1001 },
			PortBits { port: G, mask: 0b0010_0000, value: 0 },
			PortBits { port: H, mask: 0b0001_1000, value: 0b0001_0000 },
		]);
	}

	#[test]
	fn scattered_gather_inverts_scatter() {
		let bus = scattered();
		for &byte in [0x00u8, 0x01, 0x10, 0x20, 0x62, 0xa5, 0xdf, 0xff].iter() {
			let bits = bus.scatter(byte);
			assert_eq!(bus.gather(read_from(&bits)), byte, "byte 0x{:02x}", byte);
		}
	}

	#[test]
	fn gather_reads_each_port_once() {
		let bus = BusLayout::new([
			Pin::new(0, 28), Pin::new(0, 29), Pin::new(0, 30), Pin::new(0, 31),
			Pin::new(1, 0), Pin::new(1, 1), Pin::new(1, 2), Pin::new(1, 3),
		]);
		let mut reads = Vec::new();
		let byte = bus.gather(|port| {
			reads.push(port);
			if port == 0 { 0x9000_0000 } else { 0x0000_000c }
		});
		assert_eq!(reads, vec![0, 1]);
		assert_eq!(byte, 0xc9);
	}
}
