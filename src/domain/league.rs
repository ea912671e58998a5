use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported leagues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum League {
    Nba,
    Nfl,
    Nhl,
    Mlb,
    Ncaab,
    Ncaaf,
}

/// Which scoring-process generator the simulation engine uses for a league.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFamily {
    /// Per-drive discrete outcomes (football)
    Drive,
    /// Gaussian per-team scoring (basketball; CLT holds at ~80+ possessions)
    Gaussian,
    /// Per-inning / per-period Poisson-like scoring (baseball, hockey)
    Period,
}

impl League {
    pub const ALL: [League; 6] = [
        League::Nba,
        League::Nfl,
        League::Nhl,
        League::Mlb,
        League::Ncaab,
        League::Ncaaf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            League::Nba => "NBA",
            League::Nfl => "NFL",
            League::Nhl => "NHL",
            League::Mlb => "MLB",
            League::Ncaab => "NCAAB",
            League::Ncaaf => "NCAAF",
        }
    }

    pub fn sim_family(&self) -> SimFamily {
        match self {
            League::Nfl | League::Ncaaf => SimFamily::Drive,
            League::Nba | League::Ncaab => SimFamily::Gaussian,
            League::Mlb | League::Nhl => SimFamily::Period,
        }
    }

    /// Whether REGULATION-time settlement is a valid market contract.
    ///
    /// Unbounded overtime (NBA/NCAAB/NCAAF) and extra innings (MLB) mean
    /// those leagues only support FULL_GAME settlement.
    pub fn supports_regulation(&self) -> bool {
        matches!(self, League::Nfl | League::Nhl)
    }

    /// Whether the league can end a full game tied (NFL regular season only).
    pub fn full_game_tie_possible(&self) -> bool {
        matches!(self, League::Nfl)
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for League {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NBA" => Ok(League::Nba),
            "NFL" => Ok(League::Nfl),
            "NHL" => Ok(League::Nhl),
            "MLB" => Ok(League::Mlb),
            "NCAAB" => Ok(League::Ncaab),
            "NCAAF" => Ok(League::Ncaaf),
            other => Err(format!("unknown league: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for league in League::ALL {
            assert_eq!(League::from_str(league.as_str()).unwrap(), league);
        }
    }

    #[test]
    fn test_regulation_support() {
        assert!(League::Nfl.supports_regulation());
        assert!(League::Nhl.supports_regulation());
        assert!(!League::Nba.supports_regulation());
        assert!(!League::Mlb.supports_regulation());
        assert!(!League::Ncaab.supports_regulation());
        assert!(!League::Ncaaf.supports_regulation());
    }

    #[test]
    fn test_sim_families() {
        assert_eq!(League::Nfl.sim_family(), SimFamily::Drive);
        assert_eq!(League::Nba.sim_family(), SimFamily::Gaussian);
        assert_eq!(League::Mlb.sim_family(), SimFamily::Period);
        assert_eq!(League::Nhl.sim_family(), SimFamily::Period);
    }
}
