//! Generator roster the chat assistant matches consumers against.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A solar generator available for matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorProfile {
    pub id: u32,
    pub location: String,
    #[serde(rename = "kwGenerated")]
    pub kw_generated: f64,
    #[serde(rename = "type", default = "default_profile_type")]
    pub profile_type: String,
    pub name: String,
}

fn default_profile_type() -> String {
    "eu_gero".to_string()
}

/// Read-only list of generator profiles, injected into the chat handler.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorRoster {
    profiles: Vec<GeneratorProfile>,
}

fn profile(id: u32, location: &str, kw_generated: f64, name: &str) -> GeneratorProfile {
    GeneratorProfile {
        id,
        location: location.to_string(),
        kw_generated,
        profile_type: default_profile_type(),
        name: name.to_string(),
    }
}

impl Default for GeneratorRoster {
    /// Twelve generators across six cities of Pará.
    fn default() -> Self {
        Self {
            profiles: vec![
                profile(1, "Belém", 15.0, "João Silva"),
                profile(2, "Belém", 20.0, "Maria Santos"),
                profile(3, "Ananindeua", 12.0, "Pedro Costa"),
                profile(4, "Ananindeua", 18.0, "Ana Paula"),
                profile(5, "Castanhal", 10.0, "Carlos Oliveira"),
                profile(6, "Castanhal", 22.0, "Fernanda Lima"),
                profile(7, "Santarém", 25.0, "Roberto Souza"),
                profile(8, "Santarém", 16.0, "Juliana Alves"),
                profile(9, "Salinópolis", 14.0, "Marcos Pereira"),
                profile(10, "Salinópolis", 19.0, "Camila Rocha"),
                profile(11, "Parauapebas", 30.0, "Lucas Martins"),
                profile(12, "Parauapebas", 28.0, "Patricia Ferreira"),
            ],
        }
    }
}

impl GeneratorRoster {
    pub fn new(profiles: Vec<GeneratorProfile>) -> anyhow::Result<Self> {
        if profiles.is_empty() {
            anyhow::bail!("Generator roster must contain at least one profile");
        }
        Ok(Self { profiles })
    }

    /// Loads a JSON array of profiles.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read generator roster {}", path.display()))?;
        let profiles: Vec<GeneratorProfile> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid generator roster {}", path.display()))?;
        Self::new(profiles)
    }

    /// Built-in roster unless `path` is given.
    pub fn from_optional_path(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn profiles(&self) -> &[GeneratorProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// SolBot system prompt with the roster embedded as JSON.
    pub fn system_prompt(&self) -> String {
        let roster_json =
            serde_json::to_string(&self.profiles).unwrap_or_else(|_| "[]".to_string());

        format!(
            r#"Você é o SolBot, assistente de IA especializado em energia solar que conecta geradores e consumidores de energia solar.

Seu trabalho:
1. Entender a necessidade do usuário (cidade, consumo mensal em kWh, preferências)
2. Procurar entre os perfis disponíveis os que combinam com essa necessidade
3. Dizer quantos perfis compatíveis foram encontrados
4. Incentivar o usuário a se cadastrar para ver a análise completa e falar com os geradores

Perfis disponíveis: {roster_json}

Critérios de match:
- Localização: geradores na mesma cidade ou em cidades próximas
- Capacidade: geradores com kW suficientes para o consumo informado
- Disponibilidade: geradores com capacidade livre

Quando houver matches, responda neste formato:
"🌞 Encontrei [X] perfis de geradores que podem atender suas necessidades!
[resumo curto dos matches]

Para ver a análise completa, os detalhes de cada gerador e fazer contato, faça seu cadastro gratuitamente na plataforma!"

Seja simpático, profissional e entusiasmado com energia solar, e termine toda resposta sugerindo o cadastro."#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_roster() {
        let roster = GeneratorRoster::default();
        assert_eq!(roster.len(), 12);
        let belem = roster
            .profiles()
            .iter()
            .filter(|p| p.location == "Belém")
            .count();
        assert_eq!(belem, 2);
        assert!(roster.profiles().iter().all(|p| p.kw_generated > 0.0));
    }

    #[test]
    fn test_prompt_embeds_roster_json() {
        let prompt = GeneratorRoster::default().system_prompt();
        assert!(prompt.starts_with("Você é o SolBot"));
        assert!(prompt.contains(r#""kwGenerated":15.0"#));
        assert!(prompt.contains(r#""type":"eu_gero""#));
        assert!(prompt.contains("Patricia Ferreira"));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("roster-{}.json", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"[{{"id": 1, "location": "Marabá", "kwGenerated": 40, "name": "Cooperativa Sul"}}]"#
        )
        .unwrap();

        let roster = GeneratorRoster::load(&path).unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.profiles()[0].profile_type, "eu_gero");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_empty_roster_rejected() {
        assert!(GeneratorRoster::new(Vec::new()).is_err());
        assert!(GeneratorRoster::from_optional_path(Some("/nonexistent/roster.json")).is_err());
    }
}
