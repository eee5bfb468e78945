//! Daily cost of a leased server.
//!
//! This is the only definition of the pricing formula. Request estimates,
//! approved servers and the public cost preview all go through
//! [`calcular_costo_diario`], so a quoted price is always the charged price.
//!
//! ```text
//! instancia = precio_hora * 24
//! ram_extra = max(0, ram_gb - memoria_gb) * 0.005 * 24
//! disco     = disco_gb * (0.08 | 0.045) / 30
//! conexion  = 1.20 if privada else 0
//! total     = round_half_up(instancia + ram_extra + disco + conexion, 4)
//! ```

use bigdecimal::BigDecimal;
use serde::Serialize;

use crate::{Connectivity, DiskType, InstanceType};

pub const HORAS_POR_DIA: i64 = 24;
/// Disk prices are monthly; a billing month is 30 days for the disk rate.
pub const DIAS_POR_MES_TARIFA: i64 = 30;
/// Fractional digits of every persisted amount.
pub const ESCALA_MONETARIA: i64 = 4;

/// 0.005 per extra GB of RAM per hour.
pub fn tarifa_ram_extra_gb_hora() -> BigDecimal {
    BigDecimal::new(5.into(), 3)
}

/// Monthly price per GB for the given media.
pub fn tarifa_disco_gb_mes(disco_tipo: DiskType) -> BigDecimal {
    match disco_tipo {
        DiskType::Ssd => BigDecimal::new(8.into(), 2),
        DiskType::Hdd => BigDecimal::new(45.into(), 3),
    }
}

/// Flat daily surcharge for private connectivity.
pub fn recargo_conexion(conexion: Connectivity) -> BigDecimal {
    match conexion {
        Connectivity::Privada => BigDecimal::new(120.into(), 2),
        Connectivity::Publica => BigDecimal::from(0),
    }
}

/// Round to `scale` fractional digits, ties away from zero.
pub fn round_half_up(value: &BigDecimal, scale: i64) -> BigDecimal {
    let half = BigDecimal::new(5.into(), scale + 1);
    let rounded = (value.abs() + half).with_scale(scale);
    if *value < BigDecimal::from(0) {
        -rounded
    } else {
        rounded
    }
}

/// Per-component daily cost. Components are rounded for display only; `total`
/// is rounded once from the exact sum and equals [`calcular_costo_diario`].
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct DesgloseCosto {
    #[schema(value_type = String)]
    pub costo_instancia: BigDecimal,
    #[schema(value_type = String)]
    pub ram_extra_gb: BigDecimal,
    #[schema(value_type = String)]
    pub costo_ram_extra: BigDecimal,
    #[schema(value_type = String)]
    pub costo_disco: BigDecimal,
    #[schema(value_type = String)]
    pub recargo_conexion: BigDecimal,
    #[schema(value_type = String)]
    pub total: BigDecimal,
}

/// Rates in force, exposed so clients can display how an estimate is built.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct TarifasVigentes {
    pub horas_por_dia: i64,
    pub dias_por_mes_tarifa: i64,
    #[schema(value_type = String)]
    pub ram_extra_gb_hora: BigDecimal,
    #[schema(value_type = String)]
    pub ssd_gb_mes: BigDecimal,
    #[schema(value_type = String)]
    pub hdd_gb_mes: BigDecimal,
    #[schema(value_type = String)]
    pub recargo_conexion_privada: BigDecimal,
    pub escala: i64,
}

pub fn tarifas_vigentes() -> TarifasVigentes {
    TarifasVigentes {
        horas_por_dia: HORAS_POR_DIA,
        dias_por_mes_tarifa: DIAS_POR_MES_TARIFA,
        ram_extra_gb_hora: tarifa_ram_extra_gb_hora(),
        ssd_gb_mes: tarifa_disco_gb_mes(DiskType::Ssd),
        hdd_gb_mes: tarifa_disco_gb_mes(DiskType::Hdd),
        recargo_conexion_privada: recargo_conexion(Connectivity::Privada),
        escala: ESCALA_MONETARIA,
    }
}

struct Componentes {
    instancia: BigDecimal,
    ram_extra_gb: BigDecimal,
    ram_extra: BigDecimal,
    disco: BigDecimal,
    conexion: BigDecimal,
}

impl Componentes {
    fn compute(
        instance_type: &InstanceType,
        ram_gb: i32,
        disco_gb: i32,
        disco_tipo: DiskType,
        conexion: Connectivity,
    ) -> Self {
        let horas = BigDecimal::from(HORAS_POR_DIA);
        let zero = BigDecimal::from(0);

        let instancia = &instance_type.precio_hora * &horas;

        let mut ram_extra_gb = BigDecimal::from(ram_gb) - &instance_type.memoria_gb;
        if ram_extra_gb < zero {
            ram_extra_gb = zero;
        }
        let ram_extra = &ram_extra_gb * &tarifa_ram_extra_gb_hora() * horas;

        // Multiply before dividing so the only inexact step is the final /30.
        let disco = BigDecimal::from(disco_gb) * tarifa_disco_gb_mes(disco_tipo)
            / BigDecimal::from(DIAS_POR_MES_TARIFA);

        Self {
            instancia,
            ram_extra_gb,
            ram_extra,
            disco,
            conexion: recargo_conexion(conexion),
        }
    }

    fn total(&self) -> BigDecimal {
        let sum = &self.instancia + &self.ram_extra + &self.disco + &self.conexion;
        round_half_up(&sum, ESCALA_MONETARIA)
    }
}

/// Daily cost of a server of this shape, rounded half-up to 4 decimals.
///
/// Pure: callers validate ranges (see [`crate::sizing`]) before calling.
pub fn calcular_costo_diario(
    instance_type: &InstanceType,
    ram_gb: i32,
    disco_gb: i32,
    disco_tipo: DiskType,
    conexion: Connectivity,
) -> BigDecimal {
    Componentes::compute(instance_type, ram_gb, disco_gb, disco_tipo, conexion).total()
}

pub fn desglose_costo_diario(
    instance_type: &InstanceType,
    ram_gb: i32,
    disco_gb: i32,
    disco_tipo: DiskType,
    conexion: Connectivity,
) -> DesgloseCosto {
    let c = Componentes::compute(instance_type, ram_gb, disco_gb, disco_tipo, conexion);
    DesgloseCosto {
        costo_instancia: round_half_up(&c.instancia, ESCALA_MONETARIA),
        ram_extra_gb: c.ram_extra_gb.clone(),
        costo_ram_extra: round_half_up(&c.ram_extra, ESCALA_MONETARIA),
        costo_disco: round_half_up(&c.disco, ESCALA_MONETARIA),
        recargo_conexion: c.conexion.clone(),
        total: c.total(),
    }
}
